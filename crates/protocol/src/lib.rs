//! Wire protocol types for peerdrop chat and chunked file transfer.
//!
//! Text messages on the data channel are JSON control records tagged by
//! `type`; anything that does not parse as one is chat. Binary messages
//! carry exactly one framed chunk (see [`frame`]).

pub mod constants;
pub mod frame;
pub mod manifest;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{CHUNK_SIZE, MAX_FILE_SIZE};
pub use frame::{FrameError, decode_chunk_frame, encode_chunk_frame};
pub use manifest::{ChunkEntry, ChunkStatus, Manifest, ManifestError};
pub use messages::{ChunkAck, ChunkMeta, ControlMessage, ResumeState, TextMessage};
