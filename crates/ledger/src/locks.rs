//! Per-key cooperative locks.
//!
//! These serialize callers within one process only: advisory in-process
//! locks, not database locks.  A second process instance can
//! still race on the same key; see DESIGN.md for the multi-instance
//! re-architecture notes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of named async mutexes.  Acquiring the same key twice queues
/// FIFO behind the first holder; distinct keys run fully in parallel.
///
/// Lock mutexes are never removed from the map; key cardinality is bounded
/// by the number of distinct accounts and owners, which stays small for a
/// single-user install.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock for `key`.  The guard releases on drop.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                let max_seen = max_seen.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire("asset|alice|checking").await;
                    let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(inside, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "critical section overlapped");
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("key-a").await;
        // Would deadlock if "key-b" shared the mutex with "key-a".
        let _b = locks.acquire("key-b").await;
    }

    #[tokio::test]
    async fn reacquire_after_release() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.acquire("key").await;
        }
        let _again = locks.acquire("key").await;
    }
}
