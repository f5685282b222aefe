//! Counting admission gate for in-flight downloads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

/// How often a waiter re-checks cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct GateState {
    available: Mutex<usize>,
    released: Condvar,
}

/// Bounds the number of downloads in flight.
///
/// Cloning shares the same gate.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    state: Arc<GateState>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate admitting `capacity` holders at once (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Arc::new(GateState {
                available: Mutex::new(capacity),
                released: Condvar::new(),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        *self.state.available.lock()
    }

    /// Wait for a slot.
    ///
    /// Returns `None` if `cancel` fires before or while waiting, or right
    /// after a slot was obtained (the slot is released again).
    pub fn acquire(&self, cancel: &CancellationToken) -> Option<GatePermit> {
        if cancel.is_cancelled() {
            return None;
        }

        {
            let mut available = self.state.available.lock();
            while *available == 0 {
                if cancel.is_cancelled() {
                    return None;
                }
                self.state
                    .released
                    .wait_for(&mut available, CANCEL_POLL_INTERVAL);
            }
            *available -= 1;
        }

        let permit = GatePermit {
            state: Arc::clone(&self.state),
        };
        if cancel.is_cancelled() {
            // Dropping the permit hands the slot back
            return None;
        }
        Some(permit)
    }
}

/// One admitted slot. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    state: Arc<GateState>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        *self.state.available.lock() += 1;
        self.state.released.notify_one();
    }
}
