//! Pull coalescing and acknowledgment splitting.
//!
//! Every upstream batch is delivered twice: once with its entries and no
//! acknowledgment, then, if it carried one, as an empty batch holding an
//! acknowledgment that fires at most once however many receivers call it.

use super::{EventHandler, EventLogBatch, EventLogClient, Subscribers, Subscription};
use crate::error::EventLogError;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

type Pull = Shared<BoxFuture<'static, Result<(), EventLogError>>>;

pub struct DispatchingEventLogClient {
    inner: Arc<dyn EventLogClient>,
    subscribers: Arc<Subscribers>,
    /// Pull in flight, tagged with a generation so a finished pull only clears itself
    in_flight: Mutex<Option<(u64, Pull)>>,
    generation: AtomicU64,
}

impl DispatchingEventLogClient {
    pub fn new(inner: Arc<dyn EventLogClient>) -> Self {
        Self {
            inner,
            subscribers: Subscribers::new(),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn current_or_new_pull(&self) -> (u64, Pull) {
        let mut slot = self.in_flight.lock();
        if let Some((generation, pull)) = slot.as_ref() {
            trace!(generation, "Joining in-flight pull");
            return (*generation, pull.clone());
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = self.inner.clone();
        let pull = async move { inner.get_events().await }.boxed().shared();
        *slot = Some((generation, pull.clone()));
        (generation, pull)
    }
}

#[async_trait]
impl EventLogClient for DispatchingEventLogClient {
    fn enable(&self) -> Result<(), EventLogError> {
        self.inner.enable()
    }

    fn disable(&self) {
        self.inner.disable()
    }

    async fn get_events(&self) -> Result<(), EventLogError> {
        let (generation, pull) = self.current_or_new_pull();
        let result = pull.await;

        let mut slot = self.in_flight.lock();
        if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            *slot = None;
        }
        result
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        let inner = self.inner.clone();
        self.subscribers.subscribe(handler, move |subscribers| {
            vec![inner.subscribe(Arc::new(move |batch: EventLogBatch| {
                let Some(subscribers) = subscribers.upgrade() else {
                    return;
                };
                let EventLogBatch {
                    scope,
                    volume_id,
                    entries,
                    acknowledgment,
                } = batch;

                subscribers.publish(EventLogBatch {
                    scope,
                    volume_id,
                    entries,
                    acknowledgment: None,
                });
                if let Some(acknowledgment) = acknowledgment {
                    subscribers.publish(EventLogBatch {
                        scope,
                        volume_id,
                        entries: Vec::new(),
                        acknowledgment: Some(acknowledgment.once()),
                    });
                }
            }))]
        })
    }
}
