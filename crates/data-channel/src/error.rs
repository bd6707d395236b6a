//! Error types for the data channel.

/// Errors produced by the peer data channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("channel is not open")]
    NotOpen,

    #[error("invalid connection description: {0}")]
    InvalidDescription(String),
}
