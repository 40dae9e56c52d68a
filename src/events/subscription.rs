//! Subscriber bookkeeping shared by every event client.
//!
//! The first subscriber attaches the upstream; the last one to detach drops
//! it again.

use super::{EventHandler, EventLogBatch};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Drop guard for one subscription
#[must_use = "dropping a subscription detaches its handler"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach
    pub fn detached() -> Self {
        Self { detach: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

struct State {
    handlers: BTreeMap<u64, EventHandler>,
    next_id: u64,
    upstream: Vec<Subscription>,
}

pub struct Subscribers {
    state: Mutex<State>,
}

impl Subscribers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                handlers: BTreeMap::new(),
                next_id: 0,
                upstream: Vec::new(),
            }),
        })
    }

    /// Register `handler`. When it is the first one, `attach` runs and the
    /// subscriptions it returns are held until the last handler detaches.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: EventHandler,
        attach: impl FnOnce(Weak<Subscribers>) -> Vec<Subscription>,
    ) -> Subscription {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            if state.handlers.is_empty() {
                debug!("Attaching upstream event sources");
                state.upstream = attach(Arc::downgrade(self));
            }
            state.handlers.insert(id, handler);
            id
        };

        let subscribers = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.unsubscribe(id);
            }
        })
    }

    fn unsubscribe(&self, id: u64) {
        let upstream = {
            let mut state = self.state.lock();
            state.handlers.remove(&id);
            if state.handlers.is_empty() {
                std::mem::take(&mut state.upstream)
            } else {
                Vec::new()
            }
        };
        if !upstream.is_empty() {
            debug!("Detaching upstream event sources");
        }
        drop(upstream);
    }

    /// Deliver `batch` to every handler, outside the lock
    pub fn publish(&self, batch: EventLogBatch) {
        let handlers: Vec<EventHandler> = self.state.lock().handlers.values().cloned().collect();
        for handler in handlers {
            handler(batch.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_attached(&self) -> bool {
        !self.state.lock().upstream.is_empty()
    }
}
