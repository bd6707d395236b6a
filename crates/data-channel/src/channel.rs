//! The data channel: ordered text/binary messages over a byte stream.
//!
//! A read pump and a write pump own the two halves of the stream; callers
//! talk to them through a cloneable [`ChannelSender`] and a single
//! [`ChannelReceiver`]. Ready state is published on a watch channel.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DataChannelError;
use crate::wire::{read_message, write_message};
use crate::{IO_BUFFER_SIZE, SEND_QUEUE_DEPTH};

/// A single message on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Lifecycle of a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Open,
    Closing,
    Closed,
}

/// Sending half of a data channel. Cheap to clone.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<ChannelMessage>,
    state: watch::Receiver<ReadyState>,
}

impl ChannelSender {
    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// Returns `true` while messages can be sent.
    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queues a message for the write pump.
    ///
    /// Fails with [`DataChannelError::NotOpen`] unless the channel is open.
    /// Waits when the outbound queue is full.
    pub async fn send(&self, message: ChannelMessage) -> Result<(), DataChannelError> {
        if !self.is_open() {
            return Err(DataChannelError::NotOpen);
        }
        self.tx
            .send(message)
            .await
            .map_err(|_| DataChannelError::NotOpen)
    }

    /// Sends a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), DataChannelError> {
        self.send(ChannelMessage::Text(text.into())).await
    }

    /// Sends a binary message.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), DataChannelError> {
        self.send(ChannelMessage::Binary(data)).await
    }

    /// Resolves once the channel has fully closed.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ReadyState::Closed).await;
    }
}

/// Receiving half of a data channel.
pub struct ChannelReceiver {
    rx: mpsc::Receiver<ChannelMessage>,
}

impl ChannelReceiver {
    /// Next inbound message; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }
}

/// An open data channel.
pub struct DataChannel {
    sender: ChannelSender,
    receiver: ChannelReceiver,
    state: Arc<watch::Sender<ReadyState>>,
    cancel: CancellationToken,
}

impl DataChannel {
    /// Wraps an authenticated stream and spawns its read and write pumps.
    pub fn spawn<S>(stream: S, cancel: CancellationToken) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (state_tx, state_rx) = watch::channel(ReadyState::Open);
        let state_tx = Arc::new(state_tx);
        let (out_tx, out_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(SEND_QUEUE_DEPTH);

        tokio::spawn(write_pump(
            BufWriter::with_capacity(IO_BUFFER_SIZE, write_half),
            out_rx,
            Arc::clone(&state_tx),
            cancel.clone(),
        ));
        tokio::spawn(read_pump(
            BufReader::with_capacity(IO_BUFFER_SIZE, read_half),
            in_tx,
            Arc::clone(&state_tx),
            cancel.clone(),
        ));

        Self {
            sender: ChannelSender {
                tx: out_tx,
                state: state_rx,
            },
            receiver: ChannelReceiver { rx: in_rx },
            state: state_tx,
            cancel,
        }
    }

    /// Two channels connected back to back in memory.
    pub fn pair() -> (DataChannel, DataChannel) {
        let (a, b) = tokio::io::duplex(IO_BUFFER_SIZE);
        (
            DataChannel::spawn(a, CancellationToken::new()),
            DataChannel::spawn(b, CancellationToken::new()),
        )
    }

    /// A new handle for sending.
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.sender.ready_state()
    }

    /// Starts closing the channel. Queued messages are discarded.
    pub fn close(&self) {
        if self.ready_state() == ReadyState::Open {
            self.state.send_replace(ReadyState::Closing);
        }
        self.cancel.cancel();
    }

    /// Splits into sender, receiver and the token that tears the channel down.
    pub fn into_parts(self) -> (ChannelSender, ChannelReceiver, CancellationToken) {
        (self.sender, self.receiver, self.cancel)
    }
}

/// Drains the outbound queue into the stream.
async fn write_pump<W>(
    mut writer: W,
    mut out_rx: mpsc::Receiver<ChannelMessage>,
    state: Arc<watch::Sender<ReadyState>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = out_rx.recv() => {
                let Some(msg) = msg else { break };
                let written = match write_message(&mut writer, &msg).await {
                    Ok(()) => writer.flush().await.map_err(DataChannelError::from),
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    warn!(error = %e, "data channel write failed");
                    break;
                }
            }
        }
    }

    state.send_if_modified(|s| {
        if *s == ReadyState::Open {
            *s = ReadyState::Closing;
            true
        } else {
            false
        }
    });
    let _ = writer.shutdown().await;
    cancel.cancel();
    debug!("data channel write pump stopped");
}

/// Forwards inbound messages until EOF, error or cancellation.
async fn read_pump<R>(
    mut reader: R,
    in_tx: mpsc::Sender<ChannelMessage>,
    state: Arc<watch::Sender<ReadyState>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = read_message(&mut reader) => match result {
                Ok(Some(msg)) => {
                    if in_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("peer closed the data channel");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "data channel read failed");
                    break;
                }
            }
        }
    }

    state.send_replace(ReadyState::Closed);
    cancel.cancel();
    debug!("data channel read pump stopped");
}
