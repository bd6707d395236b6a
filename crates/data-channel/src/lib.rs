//! Message-oriented data channel between two peers.
//!
//! A channel carries individually framed text and binary messages in
//! order over one TCP connection (or an in-memory duplex for tests). The
//! offering peer binds a listener and publishes a [`ConnectionDescription`]
//! that the answering peer pastes to connect.
//!
//! # Wire format
//!
//! See the [`wire`] module for the framing and handshake layout.

pub mod channel;
pub mod client;
pub mod description;
pub mod error;
pub mod server;
pub mod token;
pub mod wire;

pub use channel::{ChannelMessage, ChannelReceiver, ChannelSender, DataChannel, ReadyState};
pub use description::ConnectionDescription;
pub use error::DataChannelError;
pub use server::ChannelListener;
pub use token::{generate_token, validate_token};

use std::time::Duration;

/// Read/write buffer size for the underlying stream (64 KB).
pub const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Largest single message accepted on the wire (8 MiB).
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Depth of the outbound message queue feeding the write pump.
pub const SEND_QUEUE_DEPTH: usize = 64;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the authentication handshake.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);
