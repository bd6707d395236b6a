//! Chunked file transfer with resume support and progress tracking.
//!
//! The sender plans a [`Manifest`](peerdrop_protocol::Manifest), then
//! streams framed chunks under a credit window. The receiver keeps one
//! [`TransferSession`] per channel, persists every chunk through a
//! [`ResumeStore`] before acknowledging it, and reassembles the file once
//! every index is present.

mod chunked;
mod format;
mod progress;
mod receiver;
mod sender;
mod session;
mod store;
mod validation;

pub use chunked::{Chunk, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use format::{format_size, progress_percent};
pub use progress::SpeedCalculator;
pub use receiver::{Artifact, Reaction, ReceiveEvent, ReceivedFile, Receiver, ResumeMode};
pub use sender::{ChunkSender, SendOptions, SendReport, SenderFeedback};
pub use session::{InsertOutcome, SessionStatus, TransferProgress, TransferSession};
pub use store::{ExistingTransfer, ResumeStore};
pub use validation::validate_file_name;

use peerdrop_data_channel::DataChannelError;
use peerdrop_protocol::{FrameError, ManifestError};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data channel error: {0}")]
    Channel(#[from] DataChannelError),

    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("invalid chunk frame: {0}")]
    Frame(#[from] FrameError),

    #[error("connection not established")]
    ChannelNotOpen,

    #[error("file is too large ({size} bytes, max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("chunk size {size} is out of range (1..={max})")]
    InvalidChunkSize { size: usize, max: usize },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("chunk {0} is out of range")]
    ChunkOutOfRange(u32),

    #[error("chunk {index} has {actual} bytes, expected {expected}")]
    ChunkSizeMismatch { index: u32, expected: u64, actual: u64 },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("receiver paused the transfer at chunk {0}")]
    Rejected(u32),

    #[error("cancelled")]
    Cancelled,
}
