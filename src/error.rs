//! Error types and handling for the Spillway library

use thiserror::Error;

/// Result type alias for Spillway operations
pub type Result<T> = std::result::Result<T, SpillwayError>;

/// Main error type for the Spillway library
#[derive(Error, Debug)]
pub enum SpillwayError {
    /// I/O errors, e.g. from spawning the consumer thread
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ring buffer is full and cannot accept more events
    #[error("Ring buffer is full")]
    BufferFull,

    /// Invalid configuration parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The consumer thread is already running
    #[error("Consumer is already running")]
    AlreadyRunning,

    /// The consumer was halted while waiting for events
    #[error("Consumer was halted")]
    Halted,

    /// The backlog did not drain within the shutdown budget
    #[error("Shutdown timed out with undrained backlog")]
    ShutdownTimeout,

    /// Downstream sink failure
    #[error("Sink error: {message}")]
    Sink {
        /// Error message describing the downstream failure
        message: String,
    },

    /// Generic error for unexpected conditions.
    /// This error should be used for situations that are not expected to happen
    /// in a correctly functioning system, such as a logic error in the code.
    #[error("Unexpected error: {message}")]
    Unexpected {
        /// Error message describing the unexpected condition
        message: String,
    },
}

impl SpillwayError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new downstream sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Create a new unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BufferFull | Self::Sink { .. })
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::SpillwayError::config(format!($($arg)*))
    };
}
