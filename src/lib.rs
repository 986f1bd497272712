//! Spillway - asynchronous front-end for synchronous log sinks
//!
//! Spillway places a lock-free, LMAX Disruptor-style ring buffer between
//! producers and a slow synchronous sink. Producers on any thread hand off
//! records without paying the sink's I/O latency; a single consumer thread
//! drains them in FIFO order and forwards each to the downstream sink.
//! Overload behavior is explicit: drop with accounting (default) or block
//! until capacity frees up.
//!
//! ## Example Usage
//!
//! ```rust
//! use spillway::{ BackgroundSink, DownstreamSink, Result, SinkConfig };
//!
//! struct Stdout;
//!
//! impl DownstreamSink<String> for Stdout {
//!     fn emit(&self, record: String) -> Result<()> {
//!         println!("{record}");
//!         Ok(())
//!     }
//! }
//!
//! let sink = BackgroundSink::wrap(Stdout, SinkConfig::default())?;
//! sink.publish("hello".to_string());
//! sink.close()?;
//! # Ok::<(), spillway::SpillwayError>(())
//! ```

pub mod config;
pub mod constants;
pub mod counters;
pub mod disruptor;
pub mod error;
pub mod sink;

// Re-export main components
pub use config::SinkConfig;
pub use counters::{ CounterRates, DiagnosticsBridge, SinkCounters };
pub use error::{ Result, SpillwayError };
pub use sink::{ BackgroundSink, DownstreamSink };

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
