//! Public types for the peer orchestrator.

use std::path::PathBuf;

use peerdrop_transfer::{ReceiveEvent, ResumeMode, SendOptions, SendReport, TransferProgress};

/// Events emitted by a [`Peer`](crate::Peer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The channel is open and our username was sent.
    Connected,
    /// The remote peer announced its username.
    RemoteUsername(String),
    /// A chat message from the remote peer.
    Chat { from: String, text: String },
    /// Progress of an incoming file.
    Receive(ReceiveEvent),
    SendProgress(TransferProgress),
    SendCompleted(SendReport),
    SendFailed { file_name: String, error: String },
    Disconnected,
}

/// Settings for one peer session.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub username: String,
    pub send: SendOptions,
    pub resume_mode: ResumeMode,
    /// Where incoming files and resume artifacts go. `None` keeps
    /// received files in memory.
    pub store_dir: Option<PathBuf>,
}

impl PeerConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            send: SendOptions::default(),
            resume_mode: ResumeMode::default(),
            store_dir: None,
        }
    }
}
