// SPDX-License-Identifier: MIT

//! A small stale-tolerant TTL cache, shared by the host-resources cache
//! here and the queue-depth cache in `toil-queue`.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub struct TtlCache<T: Clone> {
    ttl: Duration,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: Mutex::new(None) }
    }

    /// Return the cached value if still fresh, otherwise `None`.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock();
        match &*slot {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn set(&self, value: T) {
        *self.slot.lock() = Some((Instant::now(), value));
    }

    /// Force the next `get()` to miss, regardless of TTL.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}
