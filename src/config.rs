//! Configuration for the background sink
//!
//! A `SinkConfig` is built with chained `with_*` calls and validated once by
//! the coordinator. Buffer sizes below the minimum are rejected;
//! non-power-of-two sizes are rounded up to the next power of two. The two
//! shutdown-related durations can also be overridden through environment
//! variables, with absent or unparseable values falling back silently.

use crate::config_error;
use crate::constants::{
    DEFAULT_BUFFER_SIZE,
    DEFAULT_MAX_SPINS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
    DEFAULT_SPIN_BATCH_SIZE,
    DEFAULT_WAKEUP_MS,
    DEFAULT_WAKE_BATCH_SIZE,
    ENV_SHUTDOWN_TIMEOUT_MS,
    ENV_WAKEUP_MS,
    MIN_BUFFER_SIZE,
};
use crate::error::Result;

/// Read a millisecond override from the environment.
///
/// Absent, empty, or not parseable as a non-negative integer all mean "use
/// the default".
fn env_ms_override(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Configuration for the background sink coordinator
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Ring buffer capacity; power of two, at least 512
    pub buffer_size: usize,
    /// Block producers when the ring is full instead of dropping
    pub block_when_full: bool,
    /// Newly published events that justify waking a parked consumer
    pub wake_batch_size: usize,
    /// Events the consumer's spin phase waits to accumulate
    pub spin_batch_size: usize,
    /// Spin iterations before the consumer parks on the monitor
    pub max_spins: u32,
    /// Idle wake-up period for a parked consumer, in milliseconds
    pub wakeup_ms: u64,
    /// Wall-clock budget for draining the backlog at close, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            block_when_full: false,
            wake_batch_size: DEFAULT_WAKE_BATCH_SIZE,
            spin_batch_size: DEFAULT_SPIN_BATCH_SIZE,
            max_spins: DEFAULT_MAX_SPINS,
            wakeup_ms: env_ms_override(ENV_WAKEUP_MS).unwrap_or(DEFAULT_WAKEUP_MS),
            shutdown_timeout_ms: env_ms_override(ENV_SHUTDOWN_TIMEOUT_MS).unwrap_or(
                DEFAULT_SHUTDOWN_TIMEOUT_MS
            ),
        }
    }
}

impl SinkConfig {
    /// Create a configuration with defaults (environment overrides applied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring buffer capacity
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Block producers when the ring is full instead of dropping
    pub fn with_block_when_full(mut self, block: bool) -> Self {
        self.block_when_full = block;
        self
    }

    /// Set the wake batch size
    pub fn with_wake_batch_size(mut self, wake_batch_size: usize) -> Self {
        self.wake_batch_size = wake_batch_size;
        self
    }

    /// Set the spin batch size
    pub fn with_spin_batch_size(mut self, spin_batch_size: usize) -> Self {
        self.spin_batch_size = spin_batch_size;
        self
    }

    /// Set the idle wake-up period in milliseconds
    pub fn with_wakeup_ms(mut self, wakeup_ms: u64) -> Self {
        self.wakeup_ms = wakeup_ms;
        self
    }

    /// Set the shutdown drain budget in milliseconds
    pub fn with_shutdown_timeout_ms(mut self, shutdown_timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = shutdown_timeout_ms;
        self
    }

    /// Validate and normalize, rounding the buffer size up to the next power
    /// of two.
    pub fn validated(mut self) -> Result<Self> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(
                config_error!(
                    "buffer size {} is below the minimum of {}",
                    self.buffer_size,
                    MIN_BUFFER_SIZE
                )
            );
        }

        if self.spin_batch_size == 0 || self.wake_batch_size == 0 {
            return Err(config_error!("batch sizes must be greater than 0"));
        }

        self.buffer_size = self.buffer_size.next_power_of_two();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SinkConfig::default();
        assert_eq!(config.buffer_size, 16_384);
        assert!(!config.block_when_full);
        assert_eq!(config.wake_batch_size, 128);
        assert_eq!(config.spin_batch_size, 32);
    }

    #[test]
    fn test_minimum_buffer_size() {
        assert!(SinkConfig::new().with_buffer_size(511).validated().is_err());

        let config = SinkConfig::new().with_buffer_size(512).validated().unwrap();
        assert_eq!(config.buffer_size, 512);
    }

    #[test]
    fn test_non_power_of_two_rounds_up() {
        let config = SinkConfig::new().with_buffer_size(1000).validated().unwrap();
        assert_eq!(config.buffer_size, 1024);

        let config = SinkConfig::new().with_buffer_size(16_385).validated().unwrap();
        assert_eq!(config.buffer_size, 32_768);
    }

    #[test]
    fn test_builder_chain() {
        let config = SinkConfig::new()
            .with_buffer_size(2048)
            .with_block_when_full(true)
            .with_wake_batch_size(64)
            .with_spin_batch_size(16)
            .with_wakeup_ms(10)
            .with_shutdown_timeout_ms(500)
            .validated()
            .unwrap();

        assert_eq!(config.buffer_size, 2048);
        assert!(config.block_when_full);
        assert_eq!(config.wake_batch_size, 64);
        assert_eq!(config.spin_batch_size, 16);
        assert_eq!(config.wakeup_ms, 10);
        assert_eq!(config.shutdown_timeout_ms, 500);
    }

    #[test]
    fn test_env_override_parsing() {
        // Runs in its own variable namespace to stay independent of other
        // tests in this binary.
        std::env::set_var(ENV_WAKEUP_MS, "7");
        assert_eq!(env_ms_override(ENV_WAKEUP_MS), Some(7));

        std::env::set_var(ENV_WAKEUP_MS, "");
        assert_eq!(env_ms_override(ENV_WAKEUP_MS), None);

        std::env::set_var(ENV_WAKEUP_MS, "not-a-number");
        assert_eq!(env_ms_override(ENV_WAKEUP_MS), None);

        std::env::set_var(ENV_WAKEUP_MS, "-5");
        assert_eq!(env_ms_override(ENV_WAKEUP_MS), None);

        std::env::remove_var(ENV_WAKEUP_MS);
        assert_eq!(env_ms_override(ENV_WAKEUP_MS), None);
    }
}
