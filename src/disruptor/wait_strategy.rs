//! Hybrid wait strategy for the consumer thread
//!
//! Controls how the consumer waits for new events. The strategy spins briefly
//! so bursty workloads stay entirely lock-free, then parks on a monitor with a
//! bounded idle timer. Producers wake a parked consumer at most once per wake
//! batch, which keeps monitor traffic off the publish hot path; the idle timer
//! guarantees liveness when producers publish without signaling and bounds how
//! long shutdown can leave the consumer parked.

use std::sync::atomic::{ AtomicBool, AtomicI64, AtomicU64, Ordering };
use std::time::Duration;

use parking_lot::{ Condvar, Mutex };

use crate::constants::STOPPING_WAKEUP_MS;
use crate::disruptor::sequence::Sequence;

/// Spin-then-block wait strategy with batched wake-ups.
pub struct HybridWaitStrategy {
    monitor: Mutex<()>,
    condition: Condvar,
    /// Set while the consumer is parked on the monitor
    is_waiting: AtomicBool,
    /// Sequence the parked consumer is waiting for
    requested: AtomicI64,
    /// Idle wake-up period; shortened once shutdown begins
    wakeup_ms: AtomicU64,
    max_spins: u32,
    spin_batch: i64,
    wake_batch: i64,
}

impl HybridWaitStrategy {
    /// Create a strategy with the given spin and wake tuning.
    pub fn new(max_spins: u32, spin_batch: usize, wake_batch: usize, wakeup_ms: u64) -> Self {
        Self {
            monitor: Mutex::new(()),
            condition: Condvar::new(),
            is_waiting: AtomicBool::new(false),
            requested: AtomicI64::new(0),
            wakeup_ms: AtomicU64::new(wakeup_ms),
            max_spins,
            spin_batch: spin_batch as i64,
            wake_batch: wake_batch as i64,
        }
    }

    /// Events the barrier may hand out without consulting this strategy.
    ///
    /// Equals the spin batch size: once that many events are already
    /// published the consumer never needs to wait at all.
    #[inline(always)]
    pub fn min_batch(&self) -> i64 {
        self.spin_batch
    }

    /// Wait until `cursor` reaches `sequence` or the run is cancelled.
    ///
    /// Returns the cursor value observed on exit; the caller decides whether
    /// it is far enough. A cancelled wait returns early with whatever the
    /// cursor held, and the barrier surfaces the cancellation on re-entry.
    pub fn wait_for(&self, sequence: i64, cursor: &Sequence, cancelled: &AtomicBool) -> i64 {
        // Spin phase: bursty workloads resolve here without touching the
        // monitor.
        for _ in 0..self.max_spins {
            if cancelled.load(Ordering::Acquire) {
                return cursor.get();
            }
            let current = cursor.get();
            if current - sequence >= self.spin_batch {
                return current;
            }
            std::hint::spin_loop();
        }

        // Block phase. is_waiting is cleared before the monitor is released
        // so a signal cannot observe a stale flag after we leave.
        let mut guard = self.monitor.lock();
        while cursor.get() < sequence {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            self.requested.store(sequence, Ordering::Release);
            self.is_waiting.store(true, Ordering::Release);

            let timeout = Duration::from_millis(self.wakeup_ms.load(Ordering::Relaxed));
            let _ = self.condition.wait_for(&mut guard, timeout);
        }
        self.is_waiting.store(false, Ordering::Release);
        drop(guard);

        cursor.get()
    }

    /// Wake the consumer unconditionally if it is parked.
    pub fn signal_all(&self) {
        if
            self.is_waiting
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let _guard = self.monitor.lock();
            self.condition.notify_all();
        }
    }

    /// Wake the consumer only once a full wake batch has accumulated past
    /// what it asked for.
    pub fn signal_published(&self, published_up_to: i64) {
        if
            self.is_waiting.load(Ordering::Acquire) &&
            published_up_to >= self.requested.load(Ordering::Acquire) + self.wake_batch
        {
            self.signal_all();
        }
    }

    /// Shorten the idle timer so a parked consumer returns promptly, then
    /// wake it. Called once shutdown begins.
    pub fn signal_stopping(&self) {
        self.wakeup_ms.store(STOPPING_WAKEUP_MS, Ordering::Relaxed);
        self.signal_all();
    }
}
