//! LMAX Disruptor-style concurrent message-exchange engine
//!
//! This module implements the concurrent core of the crate: a power-of-two
//! ring buffer fed by a multi-producer sequencer and drained by a single
//! batch event processor, with mechanical sympathy for modern CPU
//! architectures.
//!
//! ## Key Features
//!
//! - **Pre-allocated Slots**: the ring is filled with default payloads at
//!   construction; the hot path never allocates
//! - **Lock-Free Publishing**: producers claim and publish with atomics only
//! - **Cache-Friendly**: padded sequences and padded table boundaries prevent
//!   false sharing
//! - **Batching**: the consumer drains contiguous published ranges in slices
//!   that never wrap the physical array
//! - **Hybrid Waiting**: the consumer spins briefly, then parks on a monitor
//!   with batched wake-ups and a bounded idle timer
//!
//! ## Architecture
//!
//! - [`Sequence`](sequence::Sequence): padded atomic counters for the
//!   cursor and the consumer position
//! - [`RingBuffer`](ring_buffer::RingBuffer): slot storage, sequence to
//!   slot by bitmask
//! - [`AvailabilityBuffer`](availability::AvailabilityBuffer): per-slot
//!   publication flags with wrap generations
//! - [`MultiProducerSequencer`](sequencer::MultiProducerSequencer): claim,
//!   wrap-point enforcement, publication, frontier queries
//! - [`SequenceBarrier`](barrier::SequenceBarrier): consumer-side frontier
//!   view with cancellation
//! - [`HybridWaitStrategy`](wait_strategy::HybridWaitStrategy): spin, then
//!   monitor waiting with wake-up batching
//! - [`BatchEventProcessor`](processor::BatchEventProcessor): the consumer
//!   thread driver

pub mod availability;
pub mod barrier;
pub mod processor;
pub mod ring_buffer;
pub mod sequence;
pub mod sequencer;
pub mod wait_strategy;

pub use availability::AvailabilityBuffer;
pub use barrier::SequenceBarrier;
pub use processor::{ BatchEventProcessor, BatchHandler };
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use sequencer::MultiProducerSequencer;
pub use wait_strategy::HybridWaitStrategy;
