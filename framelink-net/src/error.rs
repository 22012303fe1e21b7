//! Transport error types.

use framelink_protocol::FrameError;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("connect timeout")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection closed")]
    Closed,

    #[error("peer disconnected")]
    Disconnected,

    #[error("acceptor already running")]
    AlreadyRunning,

    #[error("acceptor not running")]
    NotRunning,
}

impl NetError {
    /// Returns whether the failed operation may succeed on a fresh
    /// connection attempt. Caller-misuse errors are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetError::Io(_) | NetError::Timeout | NetError::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(NetError::Timeout.is_retryable());
        assert!(NetError::Disconnected.is_retryable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "boom");
        assert!(NetError::Io(io).is_retryable());

        assert!(!NetError::NotConnected.is_retryable());
        assert!(!NetError::AlreadyConnected.is_retryable());
        assert!(!NetError::Closed.is_retryable());
        assert!(!NetError::AlreadyRunning.is_retryable());
        assert!(!NetError::NotRunning.is_retryable());
    }
}
