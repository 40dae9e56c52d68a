//! Local directory change source backed by `notify`.

use super::{
    Acknowledgment, EventHandler, EventLogBatch, EventLogClient, EventLogEntry, Subscribers,
    Subscription,
};
use crate::error::EventLogError;
use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Buffers watcher events and publishes them on each pull
pub struct NotifyEventLogClient {
    root: PathBuf,
    ignore_patterns: Arc<Vec<String>>,
    enabled: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
    pending: Arc<Mutex<Vec<EventLogEntry>>>,
    subscribers: Arc<Subscribers>,
    published: AtomicU64,
    acknowledged: Arc<AtomicU64>,
}

impl NotifyEventLogClient {
    pub fn new(root: impl Into<PathBuf>, ignore_patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Arc::new(ignore_patterns),
            enabled: AtomicBool::new(false),
            watcher: Mutex::new(None),
            pending: Arc::new(Mutex::new(Vec::new())),
            subscribers: Subscribers::new(),
            published: AtomicU64::new(0),
            acknowledged: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sequence number of the newest acknowledged batch; 0 when none
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Acquire)
    }

    fn start_watcher(&self) -> Result<RecommendedWatcher, EventLogError> {
        let pending = self.pending.clone();
        let ignore_patterns = self.ignore_patterns.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let entry = match res {
                Ok(event) => convert_event(event),
                Err(e) => Some(EventLogEntry::Error(e.to_string())),
            };
            if let Some(entry) = entry.filter(|e| !is_ignored(e, &ignore_patterns)) {
                pending.lock().push(entry);
            }
        })
        .map_err(|e| EventLogError::Unavailable(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| {
                EventLogError::Unavailable(format!(
                    "Failed to watch {}: {}",
                    self.root.display(),
                    e
                ))
            })?;
        Ok(watcher)
    }
}

fn convert_event(event: Event) -> Option<EventLogEntry> {
    match event.kind {
        EventKind::Create(_) => event.paths.first().map(|p| EventLogEntry::Created(p.clone())),
        EventKind::Modify(ModifyKind::Name(_)) => match event.paths.as_slice() {
            [from, to, ..] => Some(EventLogEntry::Moved {
                from: from.clone(),
                to: to.clone(),
            }),
            [path] => Some(EventLogEntry::Changed(path.clone())),
            [] => None,
        },
        EventKind::Modify(_) => event.paths.first().map(|p| EventLogEntry::Changed(p.clone())),
        EventKind::Remove(_) => event.paths.first().map(|p| EventLogEntry::Deleted(p.clone())),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => event.paths.first().map(|p| EventLogEntry::Skipped {
            path: p.clone(),
            reason: "unclassified event".to_string(),
        }),
    }
}

fn matches_pattern(path: &Path, pattern: &str) -> bool {
    let path = path.to_string_lossy().replace('\\', "/");
    let pattern = pattern.replace('\\', "/");
    !pattern.is_empty() && path.contains(&pattern)
}

fn is_ignored(entry: &EventLogEntry, patterns: &[String]) -> bool {
    let path = match entry {
        EventLogEntry::Created(p)
        | EventLogEntry::Changed(p)
        | EventLogEntry::Deleted(p)
        | EventLogEntry::Skipped { path: p, .. } => p,
        EventLogEntry::Moved { to, .. } => to,
        EventLogEntry::Error(_) => return false,
    };
    patterns.iter().any(|pattern| matches_pattern(path, pattern))
}

#[async_trait]
impl EventLogClient for NotifyEventLogClient {
    fn enable(&self) -> Result<(), EventLogError> {
        if self
            .enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        match self.start_watcher() {
            Ok(watcher) => {
                *self.watcher.lock() = Some(watcher);
                info!(root = %self.root.display(), "Watching directory");
                Ok(())
            }
            Err(e) => {
                self.enabled.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn disable(&self) {
        if self
            .enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let watcher = self.watcher.lock().take();
            drop(watcher);
            info!(root = %self.root.display(), "Stopped watching directory");
        }
    }

    async fn get_events(&self) -> Result<(), EventLogError> {
        if !self.is_enabled() {
            return Err(EventLogError::Unavailable(format!(
                "Watcher for {} is disabled",
                self.root.display()
            )));
        }

        let entries = std::mem::take(&mut *self.pending.lock());
        if entries.is_empty() {
            return Ok(());
        }

        let sequence = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        let acknowledged = self.acknowledged.clone();
        debug!(sequence, entries = entries.len(), "Publishing watcher batch");
        self.subscribers.publish(EventLogBatch::new(
            entries,
            Some(Acknowledgment::new(move || {
                acknowledged.fetch_max(sequence, Ordering::AcqRel);
            })),
        ));
        Ok(())
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        if !self.is_enabled() {
            warn!(root = %self.root.display(), "Subscribing to a disabled watcher");
        }
        self.subscribers.subscribe(handler, |_| Vec::new())
    }
}
