//! Short-lived snapshot cache with one in-flight fetch per feed group.
//!
//! Each key maps to a `OnceCell` slot. Callers arriving while the slot is
//! still empty wait on the same initialization instead of starting their own
//! fetch. A filled slot is reused until its TTL runs out. Failed fetches are
//! handed to everyone waiting on that flight and then evicted, so the next
//! request tries upstream again.
//!
//! If the caller running the fetch is dropped (e.g. its request timed out),
//! the slot stays empty and the next waiter takes over initialization.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::feed::FeedSnapshot;
use crate::identifiers::FeedGroupId;
use crate::models::types::FeedError;

pub type CachedFeed = Result<Arc<FeedSnapshot>, FeedError>;

struct Completed {
    value: CachedFeed,
    finished_at: Instant,
}

type Slot = Arc<OnceCell<Completed>>;

#[derive(Clone)]
pub struct SnapshotCache {
    slots: Arc<Mutex<HashMap<FeedGroupId, Slot>>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached snapshot for `key`, or run `fetch` to produce it.
    pub async fn get_or_fetch<F, Fut>(&self, key: &FeedGroupId, fetch: F) -> CachedFeed
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CachedFeed>,
    {
        let slot = self.slot(key);

        let completed = slot
            .get_or_init(|| async {
                let value = fetch().await;
                Completed {
                    value,
                    finished_at: Instant::now(),
                }
            })
            .await;

        let value = completed.value.clone();
        if value.is_err() {
            self.evict(key, &slot);
        }
        value
    }

    /// Join the current slot when it is in flight or fresh, else start a new one.
    fn slot(&self, key: &FeedGroupId) -> Slot {
        let mut slots = self.lock();

        if let Some(slot) = slots.get(key) {
            match slot.get() {
                None => return slot.clone(),
                Some(done) if done.value.is_ok() && done.finished_at.elapsed() < self.ttl => {
                    return slot.clone();
                }
                Some(_) => {}
            }
        }

        let slot = Slot::default();
        slots.insert(key.clone(), slot.clone());
        slot
    }

    fn evict(&self, key: &FeedGroupId, slot: &Slot) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FeedGroupId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
