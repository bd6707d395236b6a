//! Chat and file transfer over one peerdrop data channel.
//!
//! A [`Peer`] owns the read loop of a channel: it routes inbound chat,
//! usernames, manifests and chunks, feeds receiver replies back to any
//! outgoing transfer, and reports everything as [`PeerEvent`]s.

mod peer;
mod router;
pub mod types;

pub use peer::Peer;
pub use types::{PeerConfig, PeerEvent};

use peerdrop_data_channel::DataChannelError;
use peerdrop_transfer::TransferError;

/// Errors from user actions on a peer.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Channel(#[from] DataChannelError),

    #[error("no file selected")]
    NoFileSelected,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("a transfer is already in progress")]
    TransferInProgress,
}
