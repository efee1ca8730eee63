//! Session admission control.
//!
//! A counting gate bounds the number of sessions that are past admission
//! and not yet released. Acquisition never waits: a full gate rejects the
//! connection on the spot. The returned [`SessionPermit`] releases its slot
//! when dropped, so every exit path of a session gives the slot back exactly
//! once.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Process-wide counters shared by all sessions.
#[derive(Debug, Default)]
pub struct ServerStats {
    total_requests: AtomicU64,
    active_sessions: AtomicUsize,
    rejected: AtomicU64,
    completed: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate the next request id. Ids start at 1.
    pub fn next_request_id(&self) -> u64 {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Sessions that sent a response.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fixed-capacity admission gate.
#[derive(Debug, Clone)]
pub struct Admission {
    slots: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<ServerStats>,
}

impl Admission {
    pub fn new(capacity: usize, stats: Arc<ServerStats>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats,
        }
    }

    /// Take a slot if one is free. Never blocks.
    ///
    /// Returns `None` when the gate is full; the rejection is counted.
    pub fn try_acquire(&self) -> Option<SessionPermit> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => {
                let active = self.stats.active_sessions.fetch_add(1, Ordering::AcqRel) + 1;
                debug!(active, max = self.capacity, "Session acquired");
                Some(SessionPermit {
                    _permit: permit,
                    stats: Arc::clone(&self.stats),
                    capacity: self.capacity,
                })
            }
            Err(_) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Sessions currently holding a slot.
    pub fn active(&self) -> usize {
        self.stats.active_sessions()
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Wait until every admitted session has released its slot, for at most
    /// `grace`. Returns false if sessions were still running at the deadline.
    ///
    /// The slots stay taken afterwards, so nothing can be admitted again.
    pub async fn drain(&self, grace: Duration) -> bool {
        let Ok(capacity) = u32::try_from(self.capacity) else {
            return false;
        };

        match tokio::time::timeout(grace, Arc::clone(&self.slots).acquire_many_owned(capacity)).await
        {
            Ok(Ok(permits)) => {
                permits.forget();
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

/// One admitted session's slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<ServerStats>,
    capacity: usize,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let remaining = self.stats.active_sessions.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(active = remaining, max = self.capacity, "Session released");
    }
}
