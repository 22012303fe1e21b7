//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload too large for a 4-byte length prefix: {size} bytes")]
    PayloadTooLarge { size: usize },
}
