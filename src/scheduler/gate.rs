//! Global cap on agents simultaneously in session.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::supervisor::SimStats;

/// Counting gate shared by every scheduler.
#[derive(Debug, Clone)]
pub struct SessionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<SimStats>,
}

impl SessionGate {
    /// Gate admitting at most `capacity` sessions at once
    pub fn new(capacity: usize, stats: Arc<SimStats>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats,
        }
    }

    /// Configured cap
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a slot. `None` once the gate is closed.
    pub async fn enter(&self) -> Option<SessionSlot> {
        let permit = self.permits.clone().acquire_owned().await.ok()?;
        self.stats.enter_session();
        Some(SessionSlot {
            stats: self.stats.clone(),
            _permit: permit,
        })
    }

    /// Wake every waiter with `None`; held slots stay valid
    pub fn close(&self) {
        self.permits.close();
    }
}

/// One held session slot; released on drop, on every exit path.
#[derive(Debug)]
pub struct SessionSlot {
    stats: Arc<SimStats>,
    // Dropped after `Drop::drop`, so the counter falls before the permit frees.
    _permit: OwnedSemaphorePermit,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.stats.leave_session();
    }
}
