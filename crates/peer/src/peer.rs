//! The per-channel peer: user actions plus the spawned read loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use peerdrop_data_channel::{ChannelSender, DataChannel};
use peerdrop_protocol::ControlMessage;
use peerdrop_transfer::{ChunkSender, Receiver, ResumeStore, SenderFeedback, TransferError};

use crate::PeerError;
use crate::router::{RouterContext, read_loop};
use crate::types::{PeerConfig, PeerEvent};

const EVENT_QUEUE_DEPTH: usize = 256;
const FEEDBACK_QUEUE_DEPTH: usize = 64;

/// One end of a chat and file transfer session.
pub struct Peer {
    config: PeerConfig,
    channel: ChannelSender,
    cancel: CancellationToken,
    events: mpsc::Sender<PeerEvent>,
    remote_username: Arc<RwLock<Option<String>>>,
    feedback: Arc<Mutex<Option<mpsc::Sender<SenderFeedback>>>>,
    selected: Mutex<Option<PathBuf>>,
    sending: AtomicBool,
}

impl Peer {
    /// Takes over an open channel, announces our username and starts the
    /// read loop.
    pub async fn start(
        channel: DataChannel,
        config: PeerConfig,
    ) -> Result<(Arc<Peer>, mpsc::Receiver<PeerEvent>), PeerError> {
        if config.username.trim().is_empty() {
            return Err(PeerError::EmptyUsername);
        }
        let store = match &config.store_dir {
            Some(dir) => Some(ResumeStore::open(dir).await?),
            None => None,
        };
        let receiver = Receiver::new(store, config.resume_mode)
            .with_max_file_size(config.send.max_file_size);

        let (sender, inbound, cancel) = channel.into_parts();
        if !sender.is_open() {
            return Err(TransferError::ChannelNotOpen.into());
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let peer = Arc::new(Peer {
            config,
            channel: sender.clone(),
            cancel: cancel.clone(),
            events: events_tx.clone(),
            remote_username: Arc::new(RwLock::new(None)),
            feedback: Arc::new(Mutex::new(None)),
            selected: Mutex::new(None),
            sending: AtomicBool::new(false),
        });

        // Queued before the read loop exists, so it is always the first event.
        let _ = peer.events.send(PeerEvent::Connected).await;

        let ctx = RouterContext {
            channel: sender,
            events: events_tx,
            remote_username: Arc::clone(&peer.remote_username),
            feedback: Arc::clone(&peer.feedback),
            cancel,
        };
        tokio::spawn(read_loop(inbound, receiver, ctx));

        let hello = ControlMessage::Username {
            username: peer.config.username.clone(),
        };
        peer.channel
            .send_text(hello.to_text().map_err(TransferError::from)?)
            .await?;
        info!(username = %peer.config.username, "peer started");

        Ok((peer, events_rx))
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// The remote peer's username, once announced.
    pub fn remote_username(&self) -> Option<String> {
        self.remote_username
            .read()
            .ok()
            .and_then(|name| name.clone())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Sends a chat line. Blank lines are ignored.
    pub async fn send_chat(&self, text: &str) -> Result<(), PeerError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotOpen.into());
        }
        self.channel.send_text(text).await?;
        Ok(())
    }

    /// Selects the file for the next [`send_selected`](Self::send_selected).
    ///
    /// Returns its size. An oversize file is rejected and the previous
    /// selection is kept.
    pub async fn select_file(&self, path: &Path) -> Result<u64, PeerError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(TransferError::from)?
            .len();
        let max = self.config.send.max_file_size;
        if size > max {
            return Err(TransferError::FileTooLarge { size, max }.into());
        }
        if let Ok(mut selected) = self.selected.lock() {
            *selected = Some(path.to_path_buf());
        }
        Ok(size)
    }

    pub fn selected_file(&self) -> Option<PathBuf> {
        self.selected.lock().ok().and_then(|s| s.clone())
    }

    pub fn clear_selection(&self) {
        if let Ok(mut selected) = self.selected.lock() {
            *selected = None;
        }
    }

    /// Starts sending the selected file on a background task.
    ///
    /// Outcome and progress arrive as [`PeerEvent`]s. The selection is
    /// cleared once the file has been sent.
    pub fn send_selected(self: &Arc<Self>) -> Result<(), PeerError> {
        let path = self.selected_file().ok_or(PeerError::NoFileSelected)?;
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotOpen.into());
        }
        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PeerError::TransferInProgress);
        }

        // Without a window the sender never reads feedback, so none is routed.
        let window = self.config.send.ack_window;
        let (fb_tx, fb_rx) = mpsc::channel(FEEDBACK_QUEUE_DEPTH.max(window + 2));
        if window > 0 {
            if let Ok(mut slot) = self.feedback.lock() {
                *slot = Some(fb_tx);
            }
        }

        let peer = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = peer.run_send(path, fb_rx).await;
            if let Ok(mut slot) = peer.feedback.lock() {
                *slot = None;
            }
            peer.sending.store(false, Ordering::Release);
            let _ = peer.events.send(outcome).await;
        });
        Ok(())
    }

    async fn run_send(
        &self,
        path: PathBuf,
        mut feedback: mpsc::Receiver<SenderFeedback>,
    ) -> PeerEvent {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (progress_tx, mut progress_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let events = self.events.clone();
        let forward = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let _ = events.send(PeerEvent::SendProgress(progress)).await;
            }
        });

        let sender = ChunkSender::new(self.channel.clone(), self.config.send.clone())
            .with_progress(progress_tx);
        let result = sender.send_file(&path, &mut feedback, &self.cancel).await;
        drop(sender);
        let _ = forward.await;

        match result {
            Ok(report) => {
                let still_selected = self.selected_file().as_deref() == Some(path.as_path());
                if still_selected {
                    self.clear_selection();
                }
                PeerEvent::SendCompleted(report)
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "send failed");
                PeerEvent::SendFailed {
                    file_name,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Tears the channel down. Persisted chunks are kept.
    pub fn disconnect(&self) {
        info!("disconnecting");
        self.cancel.cancel();
    }

    /// Resolves once the channel has fully closed.
    pub async fn closed(&self) {
        self.channel.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn next(rx: &mut mpsc::Receiver<PeerEvent>) -> PeerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event expected")
            .expect("event stream open")
    }

    #[tokio::test]
    async fn empty_username_is_rejected() {
        let (a, _b) = DataChannel::pair();
        assert!(matches!(
            Peer::start(a, PeerConfig::new("  ")).await,
            Err(PeerError::EmptyUsername)
        ));
    }

    #[tokio::test]
    async fn usernames_are_exchanged() {
        let (a, b) = DataChannel::pair();
        let (alice, mut alice_rx) = Peer::start(a, PeerConfig::new("alice")).await.unwrap();
        let (_bob, mut bob_rx) = Peer::start(b, PeerConfig::new("bob")).await.unwrap();

        assert_eq!(next(&mut alice_rx).await, PeerEvent::Connected);
        assert_eq!(
            next(&mut alice_rx).await,
            PeerEvent::RemoteUsername("bob".into())
        );
        assert_eq!(next(&mut bob_rx).await, PeerEvent::Connected);
        assert_eq!(
            next(&mut bob_rx).await,
            PeerEvent::RemoteUsername("alice".into())
        );
        assert_eq!(alice.remote_username().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn send_without_selection_fails() {
        let (a, _b) = DataChannel::pair();
        let (peer, _rx) = Peer::start(a, PeerConfig::new("alice")).await.unwrap();
        assert!(matches!(
            peer.send_selected(),
            Err(PeerError::NoFileSelected)
        ));
    }

    #[tokio::test]
    async fn oversize_selection_keeps_previous() {
        let dir = tempfile::TempDir::new().unwrap();
        let small = dir.path().join("small.txt");
        let big = dir.path().join("big.bin");
        std::fs::write(&small, b"hi").unwrap();
        std::fs::write(&big, vec![0u8; 64]).unwrap();

        let mut config = PeerConfig::new("alice");
        config.send.max_file_size = 32;
        let (a, _b) = DataChannel::pair();
        let (peer, _rx) = Peer::start(a, config).await.unwrap();

        assert_eq!(peer.select_file(&small).await.unwrap(), 2);
        assert!(matches!(
            peer.select_file(&big).await,
            Err(PeerError::Transfer(TransferError::FileTooLarge { size: 64, max: 32 }))
        ));
        assert_eq!(peer.selected_file(), Some(small));
    }

    #[tokio::test]
    async fn actions_after_disconnect_report_closed_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"data").unwrap();

        let (a, _b) = DataChannel::pair();
        let (peer, mut rx) = Peer::start(a, PeerConfig::new("alice")).await.unwrap();
        peer.select_file(&file).await.unwrap();
        peer.disconnect();

        tokio::time::timeout(Duration::from_secs(5), peer.closed())
            .await
            .expect("channel should close");
        loop {
            if next(&mut rx).await == PeerEvent::Disconnected {
                break;
            }
        }
        assert!(!peer.is_open());
        assert!(matches!(
            peer.send_chat("hello").await,
            Err(PeerError::Transfer(TransferError::ChannelNotOpen))
        ));
        assert!(matches!(
            peer.send_selected(),
            Err(PeerError::Transfer(TransferError::ChannelNotOpen))
        ));
        // Blank chat is ignored even when closed.
        assert!(peer.send_chat("   ").await.is_ok());
    }
}
