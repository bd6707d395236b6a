//! Read loop: dispatches inbound channel messages.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use peerdrop_data_channel::{ChannelMessage, ChannelReceiver, ChannelSender};
use peerdrop_protocol::{ControlMessage, TextMessage};
use peerdrop_transfer::{Reaction, Receiver, SenderFeedback};

use crate::types::PeerEvent;

/// Shared state the read loop needs from its [`Peer`](crate::Peer).
pub(crate) struct RouterContext {
    pub channel: ChannelSender,
    pub events: mpsc::Sender<PeerEvent>,
    pub remote_username: Arc<RwLock<Option<String>>>,
    /// Feedback sink of the outgoing transfer, if one is running.
    pub feedback: Arc<Mutex<Option<mpsc::Sender<SenderFeedback>>>>,
    pub cancel: CancellationToken,
}

impl RouterContext {
    async fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event).await;
    }

    /// Sends the receiver's reply, then surfaces its events.
    async fn apply(&self, reaction: Reaction) {
        if let Some(reply) = reaction.reply {
            match reply.to_text() {
                Ok(text) => {
                    if let Err(e) = self.channel.send_text(text).await {
                        warn!(error = %e, "failed to send reply");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode reply"),
            }
        }
        for event in reaction.events {
            self.emit(PeerEvent::Receive(event)).await;
        }
    }

    /// Never blocks: the read loop must keep draining the channel.
    fn forward(&self, feedback: SenderFeedback) {
        let sink = self
            .feedback
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().cloned());
        match sink {
            Some(tx) => match tx.try_send(feedback) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(feedback)) => {
                    warn!(?feedback, "feedback queue full, dropping")
                }
            },
            None => debug!(?feedback, "feedback without an outgoing transfer"),
        }
    }

    fn remote_name(&self) -> String {
        self.remote_username
            .read()
            .ok()
            .and_then(|name| name.clone())
            .unwrap_or_else(|| "peer".to_string())
    }
}

/// Reads the channel until it closes or `ctx.cancel` fires.
pub(crate) async fn read_loop(
    mut inbound: ChannelReceiver,
    mut receiver: Receiver,
    ctx: RouterContext,
) {
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            msg = inbound.recv() => match msg {
                Some(ChannelMessage::Text(text)) => {
                    handle_text(&text, &mut receiver, &ctx).await;
                }
                Some(ChannelMessage::Binary(data)) => {
                    let reaction = receiver.on_binary(&data).await;
                    ctx.apply(reaction).await;
                }
                None => {
                    debug!("data channel closed");
                    break;
                }
            }
        }
    }

    // Persisted chunks stay on disk for a later resume.
    ctx.cancel.cancel();
    info!("peer disconnected");
    ctx.emit(PeerEvent::Disconnected).await;
}

async fn handle_text(text: &str, receiver: &mut Receiver, ctx: &RouterContext) {
    match TextMessage::parse(text) {
        TextMessage::Chat(text) => {
            let from = ctx.remote_name();
            ctx.emit(PeerEvent::Chat { from, text }).await;
        }
        TextMessage::Control(ControlMessage::Username { username }) => {
            info!(%username, "remote username");
            if let Ok(mut name) = ctx.remote_username.write() {
                *name = Some(username.clone());
            }
            ctx.emit(PeerEvent::RemoteUsername(username)).await;
        }
        TextMessage::Control(ControlMessage::Manifest { manifest }) => {
            let reaction = receiver.on_manifest(manifest).await;
            ctx.apply(reaction).await;
        }
        TextMessage::Control(ControlMessage::ChunkMeta(meta)) => {
            let reaction = receiver.on_chunk_meta(meta);
            ctx.apply(reaction).await;
        }
        TextMessage::Control(ControlMessage::ChunkAck(ack)) => {
            ctx.forward(SenderFeedback::Ack(ack));
        }
        TextMessage::Control(ControlMessage::ResumeState(state)) => {
            ctx.forward(SenderFeedback::Resume(state));
        }
    }
}
