//! Per-key producer serialization for `remember`
//!
//! The first caller for a key holds the key's lock while it computes;
//! concurrent callers for the same key queue on it and re-read the cache
//! once they get through.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while a producer runs, or while waiting for one; releases the key
/// on drop
pub(crate) struct FlightGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller holds `key`
    pub(crate) async fn acquire(&self, key: &str) -> FlightGuard<'_> {
        let lock = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Built before waiting so a cancelled waiter still releases the key
        let mut flight = FlightGuard {
            owner: self,
            key: key.to_string(),
            guard: None,
        };
        flight.guard = Some(lock.lock_owned().await);
        flight
    }

    /// Keys with a holder or waiters
    pub(crate) fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Release under the map lock so no new waiter can slip in between
        let owner = self.owner;
        let mut inflight = owner.inflight.lock();
        self.guard.take();

        let idle = inflight
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            inflight.remove(&self.key);
        }
    }
}
