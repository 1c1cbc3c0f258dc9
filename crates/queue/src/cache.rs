// SPDX-License-Identifier: MIT

//! Stale-tolerant TTL cache for the depth-by-priority histogram.

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

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_then_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
        cache.set(7);
        assert_eq!(cache.get(), Some(7));
        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
