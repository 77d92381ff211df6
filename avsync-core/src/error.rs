//! Error types for avsync-core

use std::time::Duration;

use thiserror::Error;

use crate::frame::Position;

/// Result type alias for avsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for frame assembly, caching and synchronization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Frame cache created with zero slots
    #[error("Invalid cache capacity: {0}")]
    InvalidCapacity(usize),

    /// A decoder buffer could not be allocated
    #[error("Buffer allocation of {size} bytes failed")]
    AllocationFailure { size: usize },

    /// Producer is terminating or already closed
    #[error("Producer closed")]
    Closed,

    /// Consumer requested a negative position
    #[error("Invalid frame position: {0}")]
    InvalidPosition(Position),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The decoder never reported the seek target timestamp in time
    #[error("Seek to position {position} ({timestamp_ms} ms) did not complete")]
    SeekTimeout { position: Position, timestamp_ms: i64 },

    /// A bounded wait for a frame elapsed
    #[error("Timed out after {0:?} waiting for frame")]
    Timeout(Duration),

    /// The decoder engine rejected a command
    #[error("Decoder engine error: {0}")]
    Engine(String),

    /// Invalid FFI handle
    #[error("Invalid producer handle")]
    InvalidHandle,

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Convert to FFI error code
    pub fn to_ffi_code(&self) -> i32 {
        match self {
            Error::InvalidCapacity(_) => 1,
            Error::AllocationFailure { .. } => 2,
            Error::Closed => 3,
            Error::InvalidPosition(_) => 4,
            Error::InvalidConfig(_) => 5,
            Error::SeekTimeout { .. } => 6,
            Error::Timeout(_) => 7,
            Error::Engine(_) => 8,
            Error::InvalidHandle => 9,
            Error::Channel(_) => 99,
        }
    }

    /// Whether the error means the producer will never deliver again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Closed | Error::InvalidHandle)
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(e: crossbeam_channel::SendError<T>) -> Self {
        Error::Channel(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidCapacity(0).to_ffi_code(), 1);
        assert_eq!(Error::Closed.to_ffi_code(), 3);
        assert_eq!(Error::InvalidHandle.to_ffi_code(), 9);
    }

    #[test]
    fn test_terminal_errors() {
        assert!(Error::Closed.is_terminal());
        assert!(!Error::Timeout(Duration::from_millis(5)).is_terminal());
    }

    #[test]
    fn test_channel_error() {
        let (tx, rx) = crossbeam_channel::bounded::<u8>(1);
        drop(rx);
        let err: Error = tx.send(1).unwrap_err().into();
        assert!(matches!(err, Error::Channel(_)));
    }
}
