//! Change event pipeline.
//!
//! Platform change sources implement [`EventLogClient`]; decorators with the
//! same contract are stacked around them: [`AggregatingEventLogClient`] fans
//! several per-(scope, volume) sources into one stream,
//! [`DispatchingEventLogClient`] coalesces pulls and splits acknowledgments
//! off the entries, and [`LoggingEventLogClient`] records what passes through.

pub mod aggregating;
pub mod dispatching;
pub mod logging;
pub mod subscription;
pub mod watcher;

pub use aggregating::{AggregatedSource, AggregatingEventLogClient};
pub use dispatching::DispatchingEventLogClient;
pub use logging::LoggingEventLogClient;
pub use subscription::{Subscribers, Subscription};
pub use watcher::NotifyEventLogClient;

use crate::error::EventLogError;
use crate::types::{ScopeId, VolumeId};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One observed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLogEntry {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    Skipped { path: PathBuf, reason: String },
    Error(String),
}

impl EventLogEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            EventLogEntry::Created(_) => "created",
            EventLogEntry::Changed(_) => "changed",
            EventLogEntry::Deleted(_) => "deleted",
            EventLogEntry::Moved { .. } => "moved",
            EventLogEntry::Skipped { .. } => "skipped",
            EventLogEntry::Error(_) => "error",
        }
    }
}

/// "Events processed" callback travelling with a batch
#[derive(Clone)]
pub struct Acknowledgment(Arc<dyn Fn() + Send + Sync>);

impl Acknowledgment {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(action))
    }

    pub fn acknowledge(&self) {
        (self.0)()
    }

    /// Wrap so only the first invocation, across all clones, reaches the
    /// underlying action
    pub fn once(self) -> Self {
        let fired = AtomicBool::new(false);
        Self::new(move || {
            if !fired.swap(true, Ordering::AcqRel) {
                self.acknowledge();
            }
        })
    }
}

impl fmt::Debug for Acknowledgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Acknowledgment")
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventLogBatch {
    /// Set by the aggregating decorator
    pub scope: Option<ScopeId>,
    pub volume_id: Option<VolumeId>,
    pub entries: Vec<EventLogEntry>,
    pub acknowledgment: Option<Acknowledgment>,
}

impl EventLogBatch {
    pub fn new(entries: Vec<EventLogEntry>, acknowledgment: Option<Acknowledgment>) -> Self {
        Self {
            scope: None,
            volume_id: None,
            entries,
            acknowledgment,
        }
    }

    pub fn acknowledge(&self) {
        if let Some(ack) = &self.acknowledgment {
            ack.acknowledge();
        }
    }
}

pub type EventHandler = Arc<dyn Fn(EventLogBatch) + Send + Sync>;

#[async_trait]
pub trait EventLogClient: Send + Sync {
    /// Start observing; idempotent
    fn enable(&self) -> Result<(), EventLogError>;

    /// Stop observing; idempotent
    fn disable(&self);

    /// Request a pull; batches are delivered to subscribers
    async fn get_events(&self) -> Result<(), EventLogError>;

    /// Deliver batches to `handler` until the returned subscription is dropped
    fn subscribe(&self, handler: EventHandler) -> Subscription;
}
