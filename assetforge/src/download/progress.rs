//! Aggregate progress for parallel downloads.
//!
//! Each task publishes its position and length to a slot of atomic counters;
//! a reporter thread sums the slots periodically and hands the result to a
//! callback. Readers never block writers, so the aggregate is eventually
//! consistent.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Aggregate download progress at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Bytes present on disk across all items.
    pub bytes: u64,
    /// Sum of known item lengths.
    pub total_bytes: u64,
    /// Items whose transfer is done.
    pub items_done: usize,
    /// Number of items tracked.
    pub items_total: usize,
}

impl ProgressSnapshot {
    /// Completion ratio in `[0, 1]`, 0 while nothing is known.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Callback invoked with aggregated progress.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

#[derive(Debug, Default)]
struct ItemSlot {
    position: AtomicU64,
    length: AtomicU64,
    done: AtomicBool,
}

/// Shared per-item counters.
#[derive(Debug)]
pub struct ProgressBoard {
    slots: Vec<ItemSlot>,
    items_done: AtomicUsize,
    finished: AtomicBool,
}

impl ProgressBoard {
    /// Create a board with one slot per item.
    pub fn new(items: usize) -> Self {
        Self {
            slots: (0..items).map(|_| ItemSlot::default()).collect(),
            items_done: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Publish the current position and length of item `index`.
    pub fn update(&self, index: usize, position: u64, length: u64) {
        if let Some(slot) = self.slots.get(index) {
            slot.position.store(position, Ordering::Relaxed);
            slot.length.store(length, Ordering::Relaxed);
        }
    }

    /// Mark item `index` as done. Idempotent.
    pub fn mark_done(&self, index: usize, length: u64) {
        if let Some(slot) = self.slots.get(index) {
            slot.position.store(length, Ordering::Relaxed);
            slot.length.store(length, Ordering::Relaxed);
            if !slot.done.swap(true, Ordering::SeqCst) {
                self.items_done.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Sum every slot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let (bytes, total_bytes) = self.slots.iter().fold((0u64, 0u64), |(b, t), slot| {
            (
                b + slot.position.load(Ordering::Relaxed),
                t + slot.length.load(Ordering::Relaxed),
            )
        });
        ProgressSnapshot {
            bytes,
            total_bytes,
            items_done: self.items_done.load(Ordering::SeqCst),
            items_total: self.slots.len(),
        }
    }

    /// Signal that no more updates will arrive.
    pub fn signal_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Background thread that polls a [`ProgressBoard`] and reports it.
///
/// Stops (after one final report) when dropped or when the board is
/// signalled finished.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    board: Arc<ProgressBoard>,
}

impl ProgressReporter {
    /// Start polling `board` every `poll_interval`.
    pub fn start(
        board: Arc<ProgressBoard>,
        callback: ProgressCallback,
        poll_interval: Duration,
    ) -> Self {
        let polled = Arc::clone(&board);

        let handle = thread::spawn(move || {
            while !polled.is_finished() {
                callback(polled.snapshot());
                thread::sleep(poll_interval);
            }

            // Final report
            callback(polled.snapshot());
        });

        Self {
            handle: Some(handle),
            board,
        }
    }

    /// Start a reporter with default 100ms poll interval.
    pub fn start_default(board: Arc<ProgressBoard>, callback: ProgressCallback) -> Self {
        Self::start(board, callback, Duration::from_millis(100))
    }

    /// Stop the reporter and wait for its final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.board.signal_finished();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_board_new() {
        let board = ProgressBoard::new(3);
        assert_eq!(board.len(), 3);
        assert_eq!(board.snapshot(), ProgressSnapshot {
            items_total: 3,
            ..Default::default()
        });
        assert!(!board.is_finished());
    }

    #[test]
    fn test_board_sums_slots() {
        let board = ProgressBoard::new(2);
        board.update(0, 500, 1000);
        board.update(1, 300, 0);

        let snap = board.snapshot();
        assert_eq!(snap.bytes, 800);
        assert_eq!(snap.total_bytes, 1000);
    }

    #[test]
    fn test_mark_done_counts_once() {
        let board = ProgressBoard::new(2);
        board.mark_done(0, 100);
        board.mark_done(0, 100);

        let snap = board.snapshot();
        assert_eq!(snap.items_done, 1);
        assert_eq!(snap.bytes, 100);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let board = ProgressBoard::new(1);
        board.update(5, 1, 1);
        board.mark_done(5, 1);
        assert_eq!(board.snapshot().bytes, 0);
    }

    #[test]
    fn test_fraction() {
        let snap = ProgressSnapshot {
            bytes: 50,
            total_bytes: 200,
            items_done: 0,
            items_total: 1,
        };
        assert!((snap.fraction() - 0.25).abs() < f64::EPSILON);
        assert_eq!(ProgressSnapshot::default().fraction(), 0.0);
    }

    #[test]
    fn test_reporter_lifecycle() {
        let board = Arc::new(ProgressBoard::new(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let callback: ProgressCallback = Arc::new(move |snap| sink.lock().push(snap));
        let reporter = ProgressReporter::start(
            Arc::clone(&board),
            callback,
            Duration::from_millis(5),
        );

        board.mark_done(0, 42);
        thread::sleep(Duration::from_millis(30));
        reporter.stop();

        let seen = seen.lock();
        assert!(!seen.is_empty());
        // Final report always reflects the last state
        assert_eq!(seen.last().map(|s| s.bytes), Some(42));
    }
}
