//! Diagnostic decorator; forwards everything unchanged.

use super::{EventHandler, EventLogBatch, EventLogClient, EventLogEntry, Subscribers, Subscription};
use crate::error::EventLogError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LoggingEventLogClient {
    inner: Arc<dyn EventLogClient>,
    subscribers: Arc<Subscribers>,
}

impl LoggingEventLogClient {
    pub fn new(inner: Arc<dyn EventLogClient>) -> Self {
        Self {
            inner,
            subscribers: Subscribers::new(),
        }
    }
}

fn log_batch(batch: &EventLogBatch) {
    for entry in &batch.entries {
        let (scope, volume_id) = (batch.scope, batch.volume_id);
        match entry {
            EventLogEntry::Created(path) => {
                debug!(?scope, ?volume_id, path = %path.display(), "Created")
            }
            EventLogEntry::Changed(path) => {
                debug!(?scope, ?volume_id, path = %path.display(), "Changed")
            }
            EventLogEntry::Deleted(path) => {
                debug!(?scope, ?volume_id, path = %path.display(), "Deleted")
            }
            EventLogEntry::Moved { from, to } => {
                debug!(?scope, ?volume_id, from = %from.display(), to = %to.display(), "Moved")
            }
            EventLogEntry::Skipped { path, reason } => {
                info!(?scope, ?volume_id, path = %path.display(), reason = %reason, "Skipped")
            }
            EventLogEntry::Error(message) => {
                warn!(?scope, ?volume_id, error = %message, "Event source reported an error")
            }
        }
    }
    if batch.acknowledgment.is_some() {
        debug!(scope = ?batch.scope, volume_id = ?batch.volume_id, "Batch awaits acknowledgment");
    }
}

#[async_trait]
impl EventLogClient for LoggingEventLogClient {
    fn enable(&self) -> Result<(), EventLogError> {
        let result = self.inner.enable();
        match &result {
            Ok(()) => info!("Event log enabled"),
            Err(e) => warn!(error = %e, "Enabling event log failed"),
        }
        result
    }

    fn disable(&self) {
        self.inner.disable();
        info!("Event log disabled");
    }

    async fn get_events(&self) -> Result<(), EventLogError> {
        let result = self.inner.get_events().await;
        if let Err(e) = &result {
            warn!(error = %e, "Pulling events failed");
        }
        result
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        let inner = self.inner.clone();
        self.subscribers.subscribe(handler, move |subscribers| {
            vec![inner.subscribe(Arc::new(move |batch: EventLogBatch| {
                log_batch(&batch);
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers.publish(batch);
                }
            }))]
        })
    }
}
