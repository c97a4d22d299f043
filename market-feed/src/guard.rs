use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use market_shared::types::models::ListingId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Like,
    Save,
    Comment,
    Listing,
}

/// Serializes mutations per (listing, kind).
///
/// Each key maps to a fair async mutex, so mutations queued behind an
/// outstanding one run in submission order. Clones share the same table;
/// every tracker of one feed holds a clone.
type LockTable = Arc<Mutex<HashMap<(ListingId, MutationKind), Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct MutationGuard {
    locks: LockTable,
}

/// Held while a mutation runs. Releasing the last turn on a key removes
/// the key from the table.
pub struct MutationTurn {
    held: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
    key: (ListingId, MutationKind),
}

impl Drop for MutationTurn {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut locks = self.locks.lock().unwrap();
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

impl MutationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, listing: ListingId, kind: MutationKind) -> MutationTurn {
        let key = (listing, kind);
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(key).or_default().clone()
        };
        MutationTurn {
            held: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
            key,
        }
    }

    /// Drop the entries of a deleted listing.
    pub fn forget(&self, listing: ListingId) {
        self.locks.lock().unwrap().retain(|(id, _), _| *id != listing);
    }

    pub fn is_busy(&self, listing: ListingId, kind: MutationKind) -> bool {
        let locks = self.locks.lock().unwrap();
        locks
            .get(&(listing, kind))
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn queued_mutations_run_in_submission_order() {
        let guard = MutationGuard::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = guard.acquire(7, MutationKind::Like).await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let guard = guard.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _held = guard.acquire(7, MutationKind::Like).await;
                order.lock().unwrap().push(i);
            }));
            // let each task queue before spawning the next
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(guard.is_busy(7, MutationKind::Like));
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn kinds_and_listings_are_independent() {
        let guard = MutationGuard::new();
        let _like = guard.acquire(1, MutationKind::Like).await;
        let _save = guard.acquire(1, MutationKind::Save).await;
        let _other = guard.acquire(2, MutationKind::Like).await;
        assert!(guard.is_busy(1, MutationKind::Save));
        assert!(!guard.is_busy(3, MutationKind::Like));
    }

    #[tokio::test]
    async fn released_keys_leave_the_table() {
        let guard = MutationGuard::new();
        let first = guard.acquire(4, MutationKind::Comment).await;
        let queued = {
            let guard = guard.clone();
            tokio::spawn(async move {
                let _turn = guard.acquire(4, MutationKind::Comment).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(first);
        assert_eq!(guard.locks.lock().unwrap().len(), 1);
        queued.await.unwrap();
        assert!(guard.locks.lock().unwrap().is_empty());

        for id in 0..50 {
            let _turn = guard.acquire(id, MutationKind::Like).await;
        }
        assert!(guard.locks.lock().unwrap().is_empty());
    }
}
