use bson::oid::ObjectId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-call serialization point shared by the lifecycle manager and the
/// signaling registry. Any operation that reads membership state and then
/// writes based on it (join, leave, end, screen share, recording) holds the
/// call's lock across the whole check-then-write sequence, so the HTTP path
/// and the signaling path can never interleave on the same call.
///
/// Lock order is always call lock first, room lock second.
#[derive(Default)]
pub struct CallLocks {
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl CallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, call_id: ObjectId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(call_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops the table entry once a call has ended. A straggler holding the
    /// old Arc finishes under the old mutex; any later operation gets a
    /// fresh one, observes `status = ended`, and bails before mutating.
    pub fn retire(&self, call_id: &ObjectId) {
        self.locks.remove(call_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
