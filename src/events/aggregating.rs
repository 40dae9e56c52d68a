//! Fan-in of several per-(scope, volume) event sources.

use super::{EventHandler, EventLogBatch, EventLogClient, Subscribers, Subscription};
use crate::error::EventLogError;
use crate::types::{ScopeId, VolumeId};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

/// A source and the mapping it observes
#[derive(Clone)]
pub struct AggregatedSource {
    pub scope: ScopeId,
    pub volume_id: VolumeId,
    pub client: Arc<dyn EventLogClient>,
}

pub struct AggregatingEventLogClient {
    sources: Vec<AggregatedSource>,
    subscribers: Arc<Subscribers>,
}

impl AggregatingEventLogClient {
    pub fn new(sources: Vec<AggregatedSource>) -> Self {
        Self {
            sources,
            subscribers: Subscribers::new(),
        }
    }

    /// Whether the sources are currently subscribed to
    pub fn is_attached(&self) -> bool {
        self.subscribers.is_attached()
    }
}

#[async_trait]
impl EventLogClient for AggregatingEventLogClient {
    fn enable(&self) -> Result<(), EventLogError> {
        let mut first_error = None;
        for source in &self.sources {
            if let Err(e) = source.client.enable() {
                warn!(scope = source.scope, volume_id = source.volume_id, error = %e, "Failed to enable event source");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn disable(&self) {
        for source in &self.sources {
            source.client.disable();
        }
    }

    async fn get_events(&self) -> Result<(), EventLogError> {
        let results = join_all(self.sources.iter().map(|s| s.client.get_events())).await;
        results.into_iter().collect()
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        let sources = self.sources.clone();
        self.subscribers.subscribe(handler, move |subscribers| {
            sources
                .into_iter()
                .map(|source| {
                    let subscribers = subscribers.clone();
                    let (scope, volume_id) = (source.scope, source.volume_id);
                    source.client.subscribe(Arc::new(move |batch: EventLogBatch| {
                        if let Some(subscribers) = subscribers.upgrade() {
                            subscribers.publish(EventLogBatch {
                                scope: Some(scope),
                                volume_id: Some(volume_id),
                                ..batch
                            });
                        }
                    }))
                })
                .collect()
        })
    }
}
