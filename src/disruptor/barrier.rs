//! Sequence barrier between the sequencer and its consumer
//!
//! The barrier presents the sequencer's available upper bound to the consumer
//! and carries the cancellation signal for one consumer run. It holds
//! non-owning handles to the sequencer's cursor and wait strategy; the
//! coordinator owns the sequencer itself.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequencer::MultiProducerSequencer;
use crate::disruptor::wait_strategy::HybridWaitStrategy;
use crate::error::{ Result, SpillwayError };

/// Consumer-side view of the published frontier, with cancellation.
pub struct SequenceBarrier {
    sequencer: Arc<MultiProducerSequencer>,
    cursor: Arc<Sequence>,
    wait_strategy: Arc<HybridWaitStrategy>,
    cancelled: AtomicBool,
}

impl SequenceBarrier {
    pub(crate) fn new(
        sequencer: Arc<MultiProducerSequencer>,
        cursor: Arc<Sequence>,
        wait_strategy: Arc<HybridWaitStrategy>
    ) -> Self {
        Self {
            sequencer,
            cursor,
            wait_strategy,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Wait until `next` (or more) is consumable.
    ///
    /// Returns the highest contiguously published sequence at or above
    /// `next`, or a value below `next` when the wait ended early (the caller
    /// re-enters). Fails with `Halted` once this run is cancelled.
    ///
    /// When enough events are already published the wait strategy is not
    /// touched at all.
    pub fn wait_for(&self, next: i64) -> Result<i64> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(SpillwayError::Halted);
        }

        let available = self.cursor.get();
        if available - next >= self.wait_strategy.min_batch() {
            return Ok(self.sequencer.highest_published(next, available));
        }

        let observed = self.wait_strategy.wait_for(next, &self.cursor, &self.cancelled);
        if observed >= next {
            Ok(self.sequencer.highest_published(next, observed))
        } else {
            Ok(observed)
        }
    }

    /// Cancel the current run and wake the consumer promptly.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wait_strategy.signal_stopping();
    }

    /// Arm the barrier for a fresh run after a halt.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    /// Has this run been cancelled?
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::StripedCounter;

    fn barrier() -> (Arc<MultiProducerSequencer>, Arc<SequenceBarrier>) {
        let gating = Arc::new(Sequence::default());
        let wait = Arc::new(HybridWaitStrategy::new(35, 32, 128, 5));
        let counter = Arc::new(StripedCounter::new());
        let sequencer = Arc::new(
            MultiProducerSequencer::new(8, gating, wait, counter)
        );
        let barrier = MultiProducerSequencer::new_barrier(&sequencer);
        (sequencer, barrier)
    }

    #[test]
    fn test_reports_published_frontier() {
        let (sequencer, barrier) = barrier();
        let seq = sequencer.next();
        sequencer.publish(seq);

        assert_eq!(barrier.wait_for(0).unwrap(), 0);
    }

    #[test]
    fn test_cancelled_barrier_fails_fast() {
        let (_sequencer, barrier) = barrier();
        barrier.cancel();
        assert!(matches!(barrier.wait_for(0), Err(SpillwayError::Halted)));

        barrier.reset();
        assert!(!barrier.is_cancelled());
    }

    #[test]
    fn test_gap_truncates_the_frontier() {
        let (sequencer, barrier) = barrier();
        let first = sequencer.next();
        let second = sequencer.next();
        sequencer.publish(second);
        let _ = first;

        // Cursor says 1 but sequence 0 is unpublished.
        let available = barrier.wait_for(0).unwrap();
        assert!(available < 0);
    }
}
