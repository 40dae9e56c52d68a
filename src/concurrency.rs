//! Single-flight-with-preemption for file reads
//!
//! At most one read is in flight per alternate id. Registering a new read
//! cancels the token of the previous one for the same identity, and a "file
//! changed" signal cancels the current one. Nothing is queued.

use crate::types::AltId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-identity read cancellation tokens
pub struct ReadCancellationRegistry {
    /// Map from alternate id to (registration number, token of the current read)
    tokens: Mutex<HashMap<AltId, (u64, CancellationToken)>>,
    next_registration: AtomicU64,
}

/// Handle for one registered read; releasing it removes the entry only if no
/// newer read has replaced it
#[derive(Debug, Clone)]
pub struct ReadRegistration {
    pub alt_id: AltId,
    pub token: CancellationToken,
    registration: u64,
}

impl ReadCancellationRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            next_registration: AtomicU64::new(0),
        }
    }

    /// Register a read of `alt_id`, pre-empting any read already in flight.
    ///
    /// The returned token is a child of `parent`, so cancelling the caller's
    /// token cancels the read as well.
    pub fn begin_read(&self, alt_id: AltId, parent: &CancellationToken) -> ReadRegistration {
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed) + 1;
        let token = parent.child_token();

        let previous = self
            .tokens
            .lock()
            .insert(alt_id, (registration, token.clone()));
        if let Some((_, previous)) = previous {
            debug!(alt_id = %alt_id, "Pre-empting in-flight read");
            previous.cancel();
        }

        ReadRegistration {
            alt_id,
            token,
            registration,
        }
    }

    /// Cancel the read currently associated with `alt_id`; returns whether one
    /// was in flight
    pub fn file_changed(&self, alt_id: &AltId) -> bool {
        match self.tokens.lock().remove(alt_id) {
            Some((_, token)) => {
                debug!(alt_id = %alt_id, "Cancelling read of changed file");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished read
    pub fn end_read(&self, registration: &ReadRegistration) {
        let mut tokens = self.tokens.lock();
        if let Some((current, _)) = tokens.get(&registration.alt_id) {
            if *current == registration.registration {
                tokens.remove(&registration.alt_id);
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tokens.lock().len()
    }
}

impl Default for ReadCancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
