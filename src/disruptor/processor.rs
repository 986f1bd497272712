//! Single-consumer batch event processor
//!
//! Drives the consumer side of the engine on a dedicated OS thread: wait on
//! the barrier, dispatch the consumable range to the handler in physical
//! batches, advance the consumer sequence, repeat. Handler faults never stall
//! the pipeline; the failing range is reported and discarded and the sequence
//! still advances.

use std::panic::{ catch_unwind, AssertUnwindSafe };
use std::sync::atomic::{ AtomicU8, Ordering };
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{ Condvar, Mutex };
use tracing::error;

use crate::disruptor::barrier::SequenceBarrier;
use crate::disruptor::ring_buffer::RingBuffer;
use crate::disruptor::sequence::Sequence;
use crate::error::{ Result, SpillwayError };

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const HALTED: u8 = 2;

/// Receives batches of events on the consumer thread.
///
/// `on_batch` gets a contiguous slice of published slots together with the
/// sequence of the first one; implementations usually move the payloads out
/// with `std::mem::take`, which also resets the slots for reuse.
pub trait BatchHandler<E>: Send + 'static {
    /// Called once on the consumer thread before the first batch
    fn on_start(&mut self) {}

    /// Dispatch one batch
    fn on_batch(&mut self, events: &mut [E], sequence: i64);

    /// Called once on the consumer thread after the last batch
    fn on_shutdown(&mut self) {}
}

/// Latch the consumer thread opens once it has entered its loop.
struct StartLatch {
    opened: Mutex<bool>,
    condition: Condvar,
}

impl StartLatch {
    fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            condition: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut opened = self.opened.lock();
        *opened = true;
        self.condition.notify_all();
    }

    fn wait(&self) {
        let mut opened = self.opened.lock();
        while !*opened {
            self.condition.wait(&mut opened);
        }
    }
}

/// Consumer-thread driver: claim, batch-dispatch, advance.
///
/// The handler lives in a slot so a finished run returns it; a halted
/// processor can therefore be started again and resumes exactly where the
/// consumer sequence left off.
pub struct BatchEventProcessor<E, H> {
    state: Arc<AtomicU8>,
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    sequence: Arc<Sequence>,
    handler: Arc<Mutex<Option<H>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<E, H> BatchEventProcessor<E, H> where E: Send + 'static, H: BatchHandler<E> {
    /// Create a processor over the given ring and barrier.
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: Arc<SequenceBarrier>,
        sequence: Arc<Sequence>,
        handler: H
    ) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(IDLE)),
            ring,
            barrier,
            sequence,
            handler: Arc::new(Mutex::new(Some(handler))),
            thread: Mutex::new(None),
        }
    }

    /// Consumer position: highest sequence handed to the handler
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    /// Is the consumer loop currently running?
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Spawn the consumer thread and wait until it has entered its loop.
    ///
    /// Fails with `AlreadyRunning` when a previous run is still active.
    pub fn start(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == RUNNING {
            return Err(SpillwayError::AlreadyRunning);
        }

        let latch = Arc::new(StartLatch::new());
        let worker = Worker {
            state: self.state.clone(),
            ring: self.ring.clone(),
            barrier: self.barrier.clone(),
            sequence: self.sequence.clone(),
            handler: self.handler.clone(),
            latch: latch.clone(),
        };

        let handle = std::thread::Builder
            ::new()
            .name("spillway-consumer".into())
            .spawn(move || worker.run())?;

        *self.thread.lock() = Some(handle);
        latch.wait();
        Ok(())
    }

    /// Stop the consumer after the batch it is currently dispatching.
    pub fn halt(&self) {
        self.state.store(HALTED, Ordering::Release);
        self.barrier.cancel();
    }

    /// Wait for the consumer thread to finish, up to `deadline`.
    ///
    /// A thread that outlives the deadline is detached; it exits on its own
    /// once the current batch is dispatched.
    pub fn join_until(&self, deadline: Instant) {
        if let Some(handle) = self.thread.lock().take() {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::yield_now();
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

struct Worker<E, H> {
    state: Arc<AtomicU8>,
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    sequence: Arc<Sequence>,
    handler: Arc<Mutex<Option<H>>>,
    latch: Arc<StartLatch>,
}

impl<E, H> Worker<E, H> where E: Send + 'static, H: BatchHandler<E> {
    fn run(self) {
        match self.state.compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {}
            Err(HALTED) => {
                // Halted before the thread came up; nothing was consumed.
                self.latch.open();
                return;
            }
            Err(_) => {
                error!("consumer thread started twice; refusing second run");
                self.latch.open();
                return;
            }
        }

        let mut handler = match self.handler.lock().take() {
            Some(handler) => handler,
            None => {
                error!("consumer handler missing; refusing to run");
                self.state.store(IDLE, Ordering::Release);
                self.latch.open();
                return;
            }
        };

        self.barrier.reset();

        if catch_unwind(AssertUnwindSafe(|| handler.on_start())).is_err() {
            error!("handler panicked during startup; consumer not started");
            *self.handler.lock() = Some(handler);
            self.state.store(IDLE, Ordering::Release);
            self.latch.open();
            return;
        }

        self.latch.open();
        self.event_loop(&mut handler);

        if catch_unwind(AssertUnwindSafe(|| handler.on_shutdown())).is_err() {
            error!("handler panicked during shutdown");
        }
        *self.handler.lock() = Some(handler);
        self.state.store(IDLE, Ordering::Release);
    }

    fn event_loop(&self, handler: &mut H) {
        let mut next_seq = self.sequence.get() + 1;

        loop {
            match self.barrier.wait_for(next_seq) {
                Ok(available) => {
                    while next_seq <= available {
                        // The slice stops at the physical end of the array;
                        // the loop comes back for the wrapped remainder.
                        let batch = unsafe { self.ring.batch_mut(next_seq, available) };
                        let len = batch.len() as i64;

                        let dispatch = catch_unwind(
                            AssertUnwindSafe(|| handler.on_batch(batch, next_seq))
                        );
                        if dispatch.is_err() {
                            error!(
                                sequence = next_seq,
                                batch_len = len,
                                "handler panicked; discarding batch and continuing"
                            );
                        }

                        next_seq += len;
                        self.sequence.set(next_seq - 1);
                    }
                }
                Err(_) => {
                    // Cancelled. Transient cancels (restart) re-enter the
                    // loop; a halt ends the run.
                    if self.state.load(Ordering::Acquire) != RUNNING {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::StripedCounter;
    use crate::disruptor::sequencer::MultiProducerSequencer;
    use crate::disruptor::wait_strategy::HybridWaitStrategy;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Collect {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl BatchHandler<u64> for Collect {
        fn on_batch(&mut self, events: &mut [u64], _sequence: i64) {
            let mut seen = self.seen.lock();
            for event in events.iter_mut() {
                seen.push(std::mem::take(event));
            }
        }
    }

    struct Explode {
        calls: Arc<AtomicUsize>,
    }

    impl BatchHandler<u64> for Explode {
        fn on_batch(&mut self, _events: &mut [u64], _sequence: i64) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        }
    }

    struct Rig {
        sequencer: Arc<MultiProducerSequencer>,
        ring: Arc<RingBuffer<u64>>,
    }

    impl Rig {
        fn new(size: usize) -> (Self, Arc<RingBuffer<u64>>, Arc<SequenceBarrier>, Arc<Sequence>) {
            let gating = Arc::new(Sequence::default());
            let wait = Arc::new(HybridWaitStrategy::new(35, 1, 1, 5));
            let counter = Arc::new(StripedCounter::new());
            let sequencer = Arc::new(
                MultiProducerSequencer::new(size, gating.clone(), wait, counter)
            );
            let barrier = MultiProducerSequencer::new_barrier(&sequencer);
            let ring = Arc::new(RingBuffer::new(size));
            let rig = Self { sequencer, ring: ring.clone() };
            (rig, ring, barrier, gating)
        }

        fn publish(&self, value: u64) {
            let seq = self.sequencer.next();
            unsafe {
                self.ring.write(seq, value);
            }
            self.sequencer.publish(seq);
        }
    }

    fn drain_until(sequence: &Sequence, target: i64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sequence.get() < target {
            assert!(Instant::now() < deadline, "consumer did not reach {target}");
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_dispatches_in_order() {
        let (rig, ring, barrier, gating) = Rig::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let processor = BatchEventProcessor::new(
            ring,
            barrier,
            gating.clone(),
            Collect { seen: seen.clone() }
        );

        processor.start().unwrap();
        for value in 0..20u64 {
            rig.publish(value);
        }
        drain_until(&gating, 19);

        processor.halt();
        processor.join_until(Instant::now() + Duration::from_secs(5));

        assert_eq!(*seen.lock(), (0..20u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (_rig, ring, barrier, gating) = Rig::new(8);
        let processor = BatchEventProcessor::new(
            ring,
            barrier,
            gating,
            Collect { seen: Arc::new(Mutex::new(Vec::new())) }
        );

        processor.start().unwrap();
        assert!(matches!(processor.start(), Err(SpillwayError::AlreadyRunning)));

        processor.halt();
        processor.join_until(Instant::now() + Duration::from_secs(5));
    }

    #[test]
    fn test_restart_resumes_without_duplicates() {
        let (rig, ring, barrier, gating) = Rig::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let processor = BatchEventProcessor::new(
            ring,
            barrier,
            gating.clone(),
            Collect { seen: seen.clone() }
        );

        processor.start().unwrap();
        for value in 0..5u64 {
            rig.publish(value);
        }
        drain_until(&gating, 4);
        processor.halt();
        processor.join_until(Instant::now() + Duration::from_secs(5));

        processor.start().unwrap();
        for value in 5..10u64 {
            rig.publish(value);
        }
        drain_until(&gating, 9);
        processor.halt();
        processor.join_until(Instant::now() + Duration::from_secs(5));

        assert_eq!(*seen.lock(), (0..10u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_handler_does_not_stall() {
        let (rig, ring, barrier, gating) = Rig::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = BatchEventProcessor::new(
            ring,
            barrier,
            gating.clone(),
            Explode { calls: calls.clone() }
        );

        processor.start().unwrap();
        for value in 0..4u64 {
            rig.publish(value);
        }

        // The sequence advances past every poisoned batch.
        drain_until(&gating, 3);
        assert!(calls.load(Ordering::SeqCst) >= 1);

        processor.halt();
        processor.join_until(Instant::now() + Duration::from_secs(5));
    }
}
