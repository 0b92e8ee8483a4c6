// libs/appointment-cell/src/services/locks.rs
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub type SlotKey = (Uuid, NaiveDate);

/// Async mutual exclusion keyed by (practitioner, date).
///
/// A guard must be held across the conflict read and the write that depends
/// on it. Guards are owned so they can be held across `.await` points.
#[derive(Default)]
pub struct SlotLocks {
    locks: DashMap<SlotKey, Arc<Mutex<()>>>,
}

#[derive(Debug)]
pub struct SlotGuard {
    keys: Vec<SlotKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SlotGuard {
    pub fn covers(&self, key: &SlotKey) -> bool {
        self.keys.contains(key)
    }
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: SlotKey) -> Arc<Mutex<()>> {
        // Clone out so the shard lock is released before awaiting
        self.locks.entry(key).or_default().value().clone()
    }

    pub async fn acquire(&self, key: SlotKey) -> SlotGuard {
        self.acquire_all(vec![key]).await
    }

    /// Locks every key in ascending order so two callers needing the same
    /// pair cannot deadlock.
    pub async fn acquire_all(&self, mut keys: Vec<SlotKey>) -> SlotGuard {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.handle(*key).lock_owned().await);
        }

        SlotGuard {
            keys,
            _guards: guards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn key(day: u32) -> SlotKey {
        (Uuid::nil(), NaiveDate::from_ymd_opt(2025, 3, day).unwrap())
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = SlotLocks::new();
        let guard = locks.acquire(key(10)).await;

        let mut contender = task::spawn(locks.acquire(key(10)));
        assert_pending!(contender.poll());

        drop(guard);
        assert!(contender.is_woken());
        assert_ready!(contender.poll());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = SlotLocks::new();
        let _first = locks.acquire(key(10)).await;
        let second = locks.acquire(key(11)).await;
        assert!(second.covers(&key(11)));
    }

    #[tokio::test]
    async fn test_acquire_all_dedups() {
        let locks = SlotLocks::new();
        let guard = locks.acquire_all(vec![key(12), key(10), key(12)]).await;
        assert!(guard.covers(&key(10)));
        assert!(guard.covers(&key(12)));
        assert!(!guard.covers(&key(11)));
    }
}
