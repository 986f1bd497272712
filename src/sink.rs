//! Background sink coordinator
//!
//! The coordinator is the public face of the crate: it wraps a synchronous
//! downstream sink behind the concurrent engine so producers hand off records
//! without paying the downstream's I/O latency. Producers publish from any
//! thread; one dedicated consumer thread drains the ring in FIFO order and
//! forwards each record to the downstream sink.
//!
//! Overload behavior is a policy choice: by default a full ring drops the
//! record and bumps `events_dropped`; with `block_when_full` the producer
//! waits for capacity instead. Shutdown drains the backlog within a
//! wall-clock budget before halting the consumer.

use std::panic::{ catch_unwind, AssertUnwindSafe };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };

use tracing::warn;

use crate::config::SinkConfig;
use crate::counters::{ DiagnosticsBridge, SinkCounters, StripedCounter };
use crate::disruptor::processor::{ BatchEventProcessor, BatchHandler };
use crate::disruptor::ring_buffer::RingBuffer;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequencer::MultiProducerSequencer;
use crate::disruptor::wait_strategy::HybridWaitStrategy;
use crate::error::{ Result, SpillwayError };

/// The synchronous collaborator behind the shim.
///
/// `emit` may be slow and may fail; failures are reported through the crate's
/// self-log and never stall the pipeline. `close` is invoked once at
/// coordinator shutdown.
pub trait DownstreamSink<E>: Send + Sync + 'static {
    /// Hand one record to the downstream
    fn emit(&self, record: E) -> Result<()>;

    /// Release downstream resources at coordinator shutdown
    fn close(&self) {}
}

impl<E: 'static> DownstreamSink<E> for Box<dyn DownstreamSink<E>> {
    fn emit(&self, record: E) -> Result<()> {
        (**self).emit(record)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Forwards consumed batches to the downstream sink, one record at a time.
///
/// Each emit runs under its own unwind guard so a record the downstream
/// chokes on never takes its batch neighbors down with it.
struct ForwardingHandler<E, S> {
    downstream: Arc<S>,
    _marker: std::marker::PhantomData<fn(E)>,
}

impl<E, S> BatchHandler<E> for ForwardingHandler<E, S>
    where E: Default + Send + 'static, S: DownstreamSink<E>
{
    fn on_batch(&mut self, events: &mut [E], _sequence: i64) {
        for slot in events.iter_mut() {
            let record = std::mem::take(slot);
            match catch_unwind(AssertUnwindSafe(|| self.downstream.emit(record))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%error, "downstream sink rejected event");
                }
                Err(_) => {
                    warn!("downstream sink panicked on event");
                }
            }
        }
    }
}

/// Asynchronous shim in front of a synchronous downstream sink.
///
/// Created with [`BackgroundSink::wrap`]; the consumer thread runs from
/// construction until [`close`](BackgroundSink::close). Dropping the sink
/// performs a best-effort close.
pub struct BackgroundSink<E, S> where E: Default + Send + 'static, S: DownstreamSink<E> {
    config: SinkConfig,
    ring: Arc<RingBuffer<E>>,
    sequencer: Arc<MultiProducerSequencer>,
    processor: BatchEventProcessor<E, ForwardingHandler<E, S>>,
    wait_strategy: Arc<HybridWaitStrategy>,
    consumer: Arc<Sequence>,
    downstream: Arc<S>,
    closing: AtomicBool,
    events_dropped: Arc<StripedCounter>,
    buffer_unavailable: Arc<StripedCounter>,
}

impl<E, S> BackgroundSink<E, S> where E: Default + Send + 'static, S: DownstreamSink<E> {
    /// Wrap `downstream` behind a freshly started background consumer.
    ///
    /// Validates the configuration, allocates the ring, and spawns the
    /// consumer thread; the returned sink is ready for `publish` from any
    /// thread.
    pub fn wrap(downstream: S, config: SinkConfig) -> Result<Self> {
        let config = config.validated()?;

        let events_dropped = Arc::new(StripedCounter::new());
        let buffer_unavailable = Arc::new(StripedCounter::new());

        let wait_strategy = Arc::new(
            HybridWaitStrategy::new(
                config.max_spins,
                config.spin_batch_size,
                config.wake_batch_size,
                config.wakeup_ms
            )
        );

        let consumer = Arc::new(Sequence::default());
        let ring = Arc::new(RingBuffer::new(config.buffer_size));
        let sequencer = Arc::new(
            MultiProducerSequencer::new(
                config.buffer_size,
                consumer.clone(),
                wait_strategy.clone(),
                buffer_unavailable.clone()
            )
        );

        let downstream = Arc::new(downstream);
        let handler = ForwardingHandler {
            downstream: downstream.clone(),
            _marker: std::marker::PhantomData,
        };

        let processor = BatchEventProcessor::new(
            ring.clone(),
            MultiProducerSequencer::new_barrier(&sequencer),
            consumer.clone(),
            handler
        );
        processor.start()?;

        Ok(Self {
            config,
            ring,
            sequencer,
            processor,
            wait_strategy,
            consumer,
            downstream,
            closing: AtomicBool::new(false),
            events_dropped,
            buffer_unavailable,
        })
    }

    /// Hand off one record for asynchronous delivery.
    ///
    /// Never fails and never blocks under the drop policy: a full ring bumps
    /// `events_dropped` and the record is discarded. Under the block policy
    /// the call waits for capacity instead. Records published after `close`
    /// are silently ignored without touching the overload counters.
    pub fn publish(&self, record: E) {
        if self.closing.load(Ordering::Acquire) {
            return;
        }

        let sequence = if self.config.block_when_full {
            self.sequencer.next()
        } else {
            match self.sequencer.try_next() {
                Ok(sequence) => sequence,
                Err(_) => {
                    self.events_dropped.increment();
                    return;
                }
            }
        };

        // Claim, write, publish: straight-line so a successful claim is
        // always published.
        unsafe {
            self.ring.write(sequence, record);
        }
        self.sequencer.publish(sequence);
    }

    /// Is there anything accepted but not yet handed downstream?
    pub fn has_backlog(&self) -> bool {
        self.processor.is_running() && self.sequencer.cursor_value() > self.consumer.get()
    }

    /// Drain and shut down within the configured budget.
    pub fn close(&self) -> Result<()> {
        self.close_with_timeout(Duration::from_millis(self.config.shutdown_timeout_ms))
    }

    /// Drain and shut down within `timeout`.
    ///
    /// The first call wins; repeated calls are no-ops returning `Ok`. On a
    /// drained backlog every record accepted before the close has reached the
    /// downstream exactly once. A backlog that outlives the budget is
    /// reported and abandoned: the consumer is halted and
    /// `Err(ShutdownTimeout)` returned.
    pub fn close_with_timeout(&self, timeout: Duration) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        let mut timed_out = false;

        while self.has_backlog() {
            if Instant::now() >= deadline {
                warn!(
                    backlog = self.sequencer.cursor_value() - self.consumer.get(),
                    "shutdown timed out before the backlog drained"
                );
                timed_out = true;
                break;
            }
            self.wait_strategy.signal_all();
            std::thread::yield_now();
        }

        self.processor.halt();
        self.processor.join_until(deadline.max(Instant::now() + Duration::from_millis(50)));

        if catch_unwind(AssertUnwindSafe(|| self.downstream.close())).is_err() {
            warn!("downstream sink panicked during close");
        }

        if timed_out {
            Err(SpillwayError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }

    /// Point-in-time totals of the overload counters
    pub fn counters(&self) -> SinkCounters {
        SinkCounters {
            events_dropped: self.events_dropped.get(),
            buffer_unavailable: self.buffer_unavailable.get(),
        }
    }

    /// Pull-based diagnostics reader over this sink's counters
    pub fn diagnostics(&self) -> DiagnosticsBridge {
        DiagnosticsBridge::new(self.events_dropped.clone(), self.buffer_unavailable.clone())
    }

    /// Ring capacity after validation (power of two)
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<E, S> Drop for BackgroundSink<E, S> where E: Default + Send + 'static, S: DownstreamSink<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct VecSink {
        out: Arc<Mutex<Vec<u64>>>,
    }

    impl DownstreamSink<u64> for VecSink {
        fn emit(&self, record: u64) -> Result<()> {
            self.out.lock().push(record);
            Ok(())
        }
    }

    #[test]
    fn test_wrap_validates_config() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let result = BackgroundSink::wrap(
            VecSink { out },
            SinkConfig::new().with_buffer_size(100)
        );
        assert!(matches!(result, Err(SpillwayError::InvalidConfig { .. })));
    }

    #[test]
    fn test_capacity_is_rounded_up() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = BackgroundSink::wrap(
            VecSink { out },
            SinkConfig::new().with_buffer_size(1000)
        ).unwrap();

        assert_eq!(sink.capacity(), 1024);
        sink.close().unwrap();
    }

    #[test]
    fn test_publish_after_close_is_ignored() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = BackgroundSink::wrap(
            VecSink { out: out.clone() },
            SinkConfig::new().with_buffer_size(512)
        ).unwrap();

        sink.publish(1);
        sink.close().unwrap();
        sink.publish(2);

        assert_eq!(*out.lock(), vec![1]);
        let counters = sink.counters();
        assert_eq!(counters.events_dropped, 0);
    }

    #[test]
    fn test_repeated_close_is_a_noop() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = BackgroundSink::wrap(
            VecSink { out },
            SinkConfig::new().with_buffer_size(512)
        ).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        sink.close_with_timeout(Duration::from_millis(1)).unwrap();
    }
}
