//! Multi-producer sequencer
//!
//! The sequencer hands out sequence claims to any number of producer threads,
//! enforces the wrap point against the consumer, records per-slot publication,
//! and answers the consumer's question of where the safely consumable frontier
//! is.
//!
//! Producers claim with a single atomic on the cursor; the expensive acquire
//! load on the consumer sequence is elided through a gating cache that is only
//! refreshed when the wrap point might have been reached. Publication goes
//! through the availability table, so the cursor advancing past a sequence
//! does not by itself make that sequence visible to the consumer.

use std::sync::Arc;

use crate::counters::StripedCounter;
use crate::constants::CLAIM_SPINS_BEFORE_YIELD;
use crate::disruptor::availability::AvailabilityBuffer;
use crate::disruptor::barrier::SequenceBarrier;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::wait_strategy::HybridWaitStrategy;
use crate::error::{ Result, SpillwayError };

/// Claims sequence ranges for producers and tracks publication.
pub struct MultiProducerSequencer {
    buffer_size: i64,
    cursor: Arc<Sequence>,
    /// Consumer position; producers must not claim past `gating + N`
    gating: Arc<Sequence>,
    /// Latest observed consumer position; refreshed only near the wrap point
    gating_cache: Sequence,
    availability: AvailabilityBuffer,
    wait_strategy: Arc<HybridWaitStrategy>,
    buffer_unavailable: Arc<StripedCounter>,
}

impl MultiProducerSequencer {
    /// Create a sequencer over a ring of `buffer_size` slots.
    ///
    /// `buffer_size` must be a power of two; the coordinator validates this
    /// before construction.
    pub fn new(
        buffer_size: usize,
        gating: Arc<Sequence>,
        wait_strategy: Arc<HybridWaitStrategy>,
        buffer_unavailable: Arc<StripedCounter>
    ) -> Self {
        debug_assert!(buffer_size.is_power_of_two());

        Self {
            buffer_size: buffer_size as i64,
            cursor: Arc::new(Sequence::default()),
            gating,
            gating_cache: Sequence::default(),
            availability: AvailabilityBuffer::new(buffer_size),
            wait_strategy,
            buffer_unavailable,
        }
    }

    /// Highest sequence ever claimed by any producer
    #[inline(always)]
    pub fn cursor_value(&self) -> i64 {
        self.cursor.get()
    }

    /// Shared handle to the cursor, for barriers and backlog checks
    pub fn cursor(&self) -> Arc<Sequence> {
        self.cursor.clone()
    }

    /// Claim the next sequence, waiting for capacity if the ring is full.
    ///
    /// The wait signals the strategy first so a parked consumer wakes to
    /// drain, then spins on the consumer sequence with a periodic yield.
    pub fn next(&self) -> i64 {
        let next = self.cursor.increment();
        let wrap_point = next - self.buffer_size;
        let cached = self.gating_cache.get_relaxed();

        if wrap_point > cached || cached > next {
            let mut gating = self.gating.get();
            if wrap_point > gating {
                self.buffer_unavailable.increment();
                self.wait_strategy.signal_all();

                let mut spins = 0u32;
                while wrap_point > gating {
                    spins += 1;
                    if spins % CLAIM_SPINS_BEFORE_YIELD == 0 {
                        std::thread::yield_now();
                    } else {
                        std::hint::spin_loop();
                    }
                    gating = self.gating.get();
                }
            }
            self.gating_cache.set_relaxed(gating);
        }

        next
    }

    /// Claim the next sequence without waiting.
    ///
    /// CAS-only: a failed claim never advances the cursor, so there is no
    /// sequence to recycle.
    pub fn try_next(&self) -> Result<i64> {
        loop {
            let current = self.cursor.get();
            if !self.has_capacity(1, current) {
                return Err(SpillwayError::BufferFull);
            }
            if self.cursor.compare_exchange(current, current + 1) {
                return Ok(current + 1);
            }
            std::hint::spin_loop();
        }
    }

    /// Would `required` more claims fit, given the cursor at `cursor_value`?
    ///
    /// Answers false only after reconfirming against the authoritative
    /// consumer sequence.
    fn has_capacity(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = cursor_value + required - self.buffer_size;
        let cached = self.gating_cache.get_relaxed();

        if wrap_point > cached || cached > cursor_value {
            let gating = self.gating.get();
            self.gating_cache.set_relaxed(gating);
            if wrap_point > gating {
                return false;
            }
        }

        true
    }

    /// Mark `sequence` as published and wake the consumer if a full wake
    /// batch has accumulated.
    pub fn publish(&self, sequence: i64) {
        self.availability.set(sequence);
        self.wait_strategy.signal_published(sequence);
    }

    /// Highest sequence in `[low, high]` forming a contiguous published
    /// prefix.
    ///
    /// This is what keeps ordering correct under out-of-order completion of
    /// concurrent publishers: the consumer only ever sees fully populated
    /// prefixes.
    pub fn highest_published(&self, low: i64, high: i64) -> i64 {
        self.availability.highest_available(low, high)
    }

    /// Create a barrier bound to this sequencer, its cursor, and its wait
    /// strategy.
    pub fn new_barrier(this: &Arc<Self>) -> Arc<SequenceBarrier> {
        Arc::new(SequenceBarrier::new(this.clone(), this.cursor.clone(), this.wait_strategy.clone()))
    }
}
