//! Overload counters and their diagnostic bridge
//!
//! Two monotonic counters describe overload behavior: `events_dropped` (a
//! publish was refused because the ring was full) and `buffer_unavailable`
//! (a producer had to wait for the consumer). Increments happen on the
//! producer hot path, so each counter is striped across one cache-padded
//! atomic per processor; reads sum the stripes.
//!
//! The bridge is pull-based: a diagnostic reader polls snapshots and
//! per-second rates on demand. Nothing is pushed anywhere, and idle counters
//! cost nothing to hold.

use std::sync::atomic::{ AtomicU64, AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Instant;

use crossbeam::utils::CachePadded;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Stripe count, fixed at the processor count for the process lifetime
static STRIPE_COUNT: Lazy<usize> = Lazy::new(|| num_cpus::get().max(1));

static NEXT_THREAD_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_STRIPE: usize = NEXT_THREAD_STRIPE.fetch_add(1, Ordering::Relaxed);
}

/// Stripe index for the calling thread: the current CPU where the platform
/// exposes it, otherwise a stable per-thread index.
#[inline]
fn stripe_index() -> usize {
    #[cfg(target_os = "linux")]
    {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu >= 0 {
            return (cpu as usize) % *STRIPE_COUNT;
        }
    }

    THREAD_STRIPE.with(|stripe| *stripe % *STRIPE_COUNT)
}

/// Monotonic 64-bit counter striped across processors.
pub struct StripedCounter {
    stripes: Box<[CachePadded<AtomicU64>]>,
}

impl StripedCounter {
    /// Create a counter with one stripe per processor
    pub fn new() -> Self {
        let stripes = (0..*STRIPE_COUNT)
            .map(|_| CachePadded::new(AtomicU64::new(0)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { stripes }
    }

    /// Add one to the calling thread's stripe
    #[inline(always)]
    pub fn increment(&self) {
        self.stripes[stripe_index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Sum of all stripes
    pub fn get(&self) -> u64 {
        self.stripes
            .iter()
            .map(|stripe| stripe.load(Ordering::Acquire))
            .sum()
    }
}

impl Default for StripedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time totals of both overload counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCounters {
    /// Publishes refused because the ring was full (drop policy)
    pub events_dropped: u64,
    /// Times a producer had to wait for the consumer (block policy)
    pub buffer_unavailable: u64,
}

/// Per-second rates derived between two polls of the bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterRates {
    pub events_dropped_per_sec: f64,
    pub buffer_unavailable_per_sec: f64,
}

struct RateWindow {
    at: Instant,
    dropped: u64,
    unavailable: u64,
}

/// Pull-based reader over one coordinator's counters.
pub struct DiagnosticsBridge {
    dropped: Arc<StripedCounter>,
    unavailable: Arc<StripedCounter>,
    window: Mutex<RateWindow>,
}

impl DiagnosticsBridge {
    pub(crate) fn new(dropped: Arc<StripedCounter>, unavailable: Arc<StripedCounter>) -> Self {
        Self {
            window: Mutex::new(RateWindow {
                at: Instant::now(),
                dropped: dropped.get(),
                unavailable: unavailable.get(),
            }),
            dropped,
            unavailable,
        }
    }

    /// Current totals
    pub fn totals(&self) -> SinkCounters {
        SinkCounters {
            events_dropped: self.dropped.get(),
            buffer_unavailable: self.unavailable.get(),
        }
    }

    /// Per-second rates since the previous call, resetting the window.
    pub fn rates(&self) -> CounterRates {
        let now = Instant::now();
        let dropped = self.dropped.get();
        let unavailable = self.unavailable.get();

        let mut window = self.window.lock();
        let elapsed = now.duration_since(window.at).as_secs_f64().max(f64::EPSILON);
        let rates = CounterRates {
            events_dropped_per_sec: ((dropped - window.dropped) as f64) / elapsed,
            buffer_unavailable_per_sec: ((unavailable - window.unavailable) as f64) / elapsed,
        };

        window.at = now;
        window.dropped = dropped;
        window.unavailable = unavailable;

        rates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counts_across_threads() {
        let counter = Arc::new(StripedCounter::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    counter.increment();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 40_000);
    }

    #[test]
    fn test_bridge_totals() {
        let dropped = Arc::new(StripedCounter::new());
        let unavailable = Arc::new(StripedCounter::new());
        let bridge = DiagnosticsBridge::new(dropped.clone(), unavailable.clone());

        dropped.increment();
        dropped.increment();
        unavailable.increment();

        let totals = bridge.totals();
        assert_eq!(totals.events_dropped, 2);
        assert_eq!(totals.buffer_unavailable, 1);
    }

    #[test]
    fn test_bridge_rates_reset_between_polls() {
        let dropped = Arc::new(StripedCounter::new());
        let unavailable = Arc::new(StripedCounter::new());
        let bridge = DiagnosticsBridge::new(dropped.clone(), unavailable);

        for _ in 0..100 {
            dropped.increment();
        }
        let first = bridge.rates();
        assert!(first.events_dropped_per_sec > 0.0);

        // No increments since the last poll.
        let second = bridge.rates();
        assert_eq!(second.events_dropped_per_sec, 0.0);
    }
}
