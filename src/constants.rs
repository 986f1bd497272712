//! Spillway tuning constants and defaults
//!
//! This module contains the tuning constants and default configuration values
//! used throughout the crate. Runtime-adjustable values have counterparts in
//! `SinkConfig`; the constants here are their defaults.

use static_assertions::const_assert;

/// Default ring buffer size (must be power of 2 for efficient modulo operations)
pub const DEFAULT_BUFFER_SIZE: usize = 16_384;

/// Smallest ring buffer size the coordinator accepts
pub const MIN_BUFFER_SIZE: usize = 512;

/// Cache line size for alignment optimizations (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

/// Initial value of every sequence; the first claimed sequence is 0
pub const INITIAL_SEQUENCE_VALUE: i64 = -1;

/// Availability flags of padding on each side of the availability table,
/// sized so one cache line of flags separates the table from its neighbors
pub const AVAILABILITY_PAD_FLAGS: usize = CACHE_LINE_SIZE / 4;

/// Spin iterations the consumer burns before parking on the monitor
pub const DEFAULT_MAX_SPINS: u32 = 35;

/// Events the spin phase waits to accumulate before handing back a batch
pub const DEFAULT_SPIN_BATCH_SIZE: usize = 32;

/// Newly published events that justify waking a parked consumer
pub const DEFAULT_WAKE_BATCH_SIZE: usize = 128;

/// Idle wake-up period for a parked consumer, in milliseconds
pub const DEFAULT_WAKEUP_MS: u64 = 25;

/// Shortened wake-up period once shutdown begins, in milliseconds
pub const STOPPING_WAKEUP_MS: u64 = 15;

/// Wall-clock budget for draining the backlog at close, in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Environment variable overriding the idle wake-up period
pub const ENV_WAKEUP_MS: &str = "SPILLWAY_WAKEUP_MS";

/// Environment variable overriding the shutdown drain budget
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "SPILLWAY_SHUTDOWN_TIMEOUT_MS";

/// Spins a blocked producer burns between yields while waiting for capacity
pub const CLAIM_SPINS_BEFORE_YIELD: u32 = 100;

const_assert!(DEFAULT_BUFFER_SIZE.is_power_of_two());
const_assert!(MIN_BUFFER_SIZE.is_power_of_two());
const_assert!(CACHE_LINE_SIZE.is_power_of_two());

/// Validate that all constants are properly configured
pub fn validate_constants() -> Result<(), &'static str> {
    if DEFAULT_BUFFER_SIZE < MIN_BUFFER_SIZE {
        return Err("DEFAULT_BUFFER_SIZE must be at least MIN_BUFFER_SIZE");
    }

    if DEFAULT_SPIN_BATCH_SIZE == 0 || DEFAULT_WAKE_BATCH_SIZE == 0 {
        return Err("Batch sizes must be greater than 0");
    }

    if STOPPING_WAKEUP_MS > DEFAULT_WAKEUP_MS {
        return Err("STOPPING_WAKEUP_MS must not exceed DEFAULT_WAKEUP_MS");
    }

    if AVAILABILITY_PAD_FLAGS * 4 < CACHE_LINE_SIZE {
        return Err("Availability padding must cover a full cache line");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_validation() {
        assert!(validate_constants().is_ok());
    }

    #[test]
    fn test_buffer_sizes_are_powers_of_two() {
        assert!(DEFAULT_BUFFER_SIZE.is_power_of_two());
        assert!(MIN_BUFFER_SIZE.is_power_of_two());
    }

    #[test]
    fn test_wake_thresholds_are_reasonable() {
        assert!(DEFAULT_SPIN_BATCH_SIZE > 0);
        assert!(DEFAULT_WAKE_BATCH_SIZE >= DEFAULT_SPIN_BATCH_SIZE);
        assert!(DEFAULT_WAKEUP_MS > 0);
    }
}
