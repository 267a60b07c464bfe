//! Per-row serialization for read-check-write sequences.
//!
//! Allocation, showroom sales and negotiation all read a row, decide, and write back. Two
//! requests against the same row are serialized here before their transactions start; on
//! Postgres the re-read inside the transaction is additionally taken `FOR UPDATE`.
//!
//! Keys are acquired in sorted order, and callers that need a second batch of keys (for
//! example a purchase order first, then the inventory rows named in it) always take the
//! entity key before any `inventory:` key.
//!
//! A key's mutex is dropped from the table once its last guard is released and nobody is
//! queued on it.

use dashmap::DashMap;
use sea_orm::{DbBackend, QuerySelect};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub fn lock_key(kind: &str, id: impl Display) -> String {
    format!("{}:{}", kind, id)
}

/// Applies `SELECT ... FOR UPDATE` on backends that support row locks.
pub fn for_update<Q: QuerySelect>(query: Q, backend: DbBackend) -> Q {
    match backend {
        DbBackend::Postgres | DbBackend::MySql => query.lock_exclusive(),
        DbBackend::Sqlite => query,
    }
}

#[derive(Clone, Default)]
pub struct RowLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Holds every acquired row lock until dropped.
#[must_use]
pub struct RowGuard {
    table: Arc<DashMap<String, Arc<Mutex<()>>>>,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl RowGuard {
    pub fn extend(&mut self, mut other: RowGuard) {
        self.held.append(&mut other.held);
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain(..) {
            drop(guard);
            // Waiters hold their own clone, so a count of one means only the table is left.
            self.table
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire<I, S>(&self, keys: I) -> RowGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut held = Vec::with_capacity(ordered.len());
        for key in ordered {
            let mutex = self
                .inner
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            held.push((key, mutex.lock_owned().await));
        }
        RowGuard {
            table: self.inner.clone(),
            held,
        }
    }

    pub async fn acquire_one(&self, key: String) -> RowGuard {
        self.acquire([key]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn duplicate_keys_are_collapsed() {
        let locks = RowLocks::new();
        let guard = locks
            .acquire(vec![lock_key("inventory", "Steel"), lock_key("inventory", "Steel")])
            .await;
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn released_keys_leave_the_table() {
        let locks = RowLocks::new();
        let mut guard = locks.acquire_one(lock_key("sales", 7)).await;
        guard.extend(locks.acquire([lock_key("inventory", "Oak")]).await);
        assert_eq!(locks.inner.len(), 2);
        drop(guard);
        assert!(locks.inner.is_empty());

        for id in 0..100 {
            let _guard = locks.acquire_one(lock_key("dispatch", id)).await;
        }
        assert!(locks.inner.is_empty());
    }

    #[tokio::test]
    async fn queued_waiter_keeps_the_key_alive() {
        let locks = RowLocks::new();
        let first = locks.acquire_one(lock_key("showroom", 3)).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire_one(lock_key("showroom", 3)).await;
            })
        };
        while Arc::strong_count(&*locks.inner.get("showroom:3").unwrap()) < 3 {
            tokio::task::yield_now().await;
        }
        drop(first);
        waiter.await.unwrap();
        assert!(locks.inner.is_empty());
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = RowLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire_one(lock_key("showroom", 1)).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_key_sets_do_not_deadlock() {
        let locks = RowLocks::new();
        let a = {
            let locks = locks.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _g = locks.acquire(["inventory:Oak", "inventory:Steel"]).await;
                }
            })
        };
        let b = {
            let locks = locks.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _g = locks.acquire(["inventory:Steel", "inventory:Oak"]).await;
                }
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("lock ordering should prevent deadlock");
    }
}
