//! Sending side of a transfer.
//!
//! The sender announces a manifest, learns which chunks the receiver still
//! needs, then streams `chunk-meta` + framed binary pairs. With a non-zero
//! window at most `ack_window` chunks are unacknowledged at any time.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use peerdrop_data_channel::{ChannelSender, DataChannelError, MAX_MESSAGE_SIZE};
use peerdrop_protocol::constants::{DEFAULT_ACK_TIMEOUT, DEFAULT_ACK_WINDOW};
use peerdrop_protocol::frame::FRAME_HEADER_LEN;
use peerdrop_protocol::{
    CHUNK_SIZE, ChunkAck, ChunkMeta, ControlMessage, MAX_FILE_SIZE, Manifest, ResumeState,
    encode_chunk_frame,
};

use crate::TransferError;
use crate::chunked::{ChunkReader, calculate_file_checksum};
use crate::session::TransferProgress;
use crate::validation::validate_file_name;

/// Tunables for [`ChunkSender`].
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub chunk_size: usize,
    pub max_file_size: u64,
    /// Maximum unacknowledged chunks; 0 sends without waiting for acks.
    pub ack_window: usize,
    pub ack_timeout: Duration,
}

impl SendOptions {
    /// Largest chunk whose frame still fits in one channel message.
    pub const MAX_CHUNK_SIZE: usize = MAX_MESSAGE_SIZE - FRAME_HEADER_LEN;

    /// Rejects settings the channel cannot carry.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 || self.chunk_size > Self::MAX_CHUNK_SIZE {
            return Err(TransferError::InvalidChunkSize {
                size: self.chunk_size,
                max: Self::MAX_CHUNK_SIZE,
            });
        }
        Ok(())
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_file_size: MAX_FILE_SIZE,
            ack_window: DEFAULT_ACK_WINDOW,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Receiver replies routed back to an in-flight send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderFeedback {
    Resume(ResumeState),
    Ack(ChunkAck),
}

/// Summary of a finished send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub file_name: String,
    pub total_size: u64,
    pub chunks_sent: usize,
    /// Chunks the receiver already held from an earlier attempt.
    pub chunks_skipped: usize,
}

/// Streams files over a data channel.
pub struct ChunkSender {
    channel: ChannelSender,
    options: SendOptions,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl ChunkSender {
    pub fn new(channel: ChannelSender, options: SendOptions) -> Self {
        Self {
            channel,
            options,
            progress: None,
        }
    }

    /// Reports progress on `tx`. Updates are dropped when `tx` is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Checks that a file of `size` bytes can be sent now.
    pub fn check_ready(&self, size: u64) -> Result<(), TransferError> {
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotOpen);
        }
        self.options.validate()?;
        if size > self.options.max_file_size {
            return Err(TransferError::FileTooLarge {
                size,
                max: self.options.max_file_size,
            });
        }
        Ok(())
    }

    /// Sends the file at `path`.
    ///
    /// `feedback` carries the receiver's `resume-state` and `chunk-ack`
    /// replies for this channel.
    pub async fn send_file(
        &self,
        path: &Path,
        feedback: &mut mpsc::Receiver<SenderFeedback>,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransferError> {
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotOpen);
        }
        let size = tokio::fs::metadata(path).await?.len();
        self.check_ready(size)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
        validate_file_name(file_name)?;

        let sha256 = calculate_file_checksum(path).await?;
        let file = tokio::fs::File::open(path).await?;
        self.send_source(file_name, size, file, Some(sha256), feedback, cancel)
            .await
    }

    /// Sends `total_size` bytes from `source` under `file_name`.
    pub async fn send_source<R>(
        &self,
        file_name: &str,
        total_size: u64,
        source: R,
        sha256: Option<String>,
        feedback: &mut mpsc::Receiver<SenderFeedback>,
        cancel: &CancellationToken,
    ) -> Result<SendReport, TransferError>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        self.check_ready(total_size)?;

        let mut manifest = Manifest::plan(file_name, total_size, self.options.chunk_size as u64)?;
        if let Some(sha256) = sha256 {
            manifest = manifest.with_checksum(sha256);
        }
        let count = manifest.chunk_count();

        // Replies left over from an aborted send must not satisfy this one.
        while feedback.try_recv().is_ok() {}

        self.send_control(&ControlMessage::Manifest {
            manifest: manifest.clone(),
        })
        .await?;
        info!(
            file = file_name,
            size = total_size,
            chunks = count,
            window = self.options.ack_window,
            "sending file"
        );

        let to_send: Vec<u32> = if self.options.ack_window > 0 {
            let state = self.await_resume_state(file_name, feedback, cancel).await?;
            let mut missing: Vec<u32> = state
                .missing_chunks
                .into_iter()
                .filter(|&i| (i as usize) < count)
                .collect();
            missing.sort_unstable();
            missing.dedup();
            missing
        } else {
            (0..count as u32).collect()
        };
        let chunks_skipped = count - to_send.len();

        let mut transferred = total_size.saturating_sub(
            to_send
                .iter()
                .filter_map(|&i| manifest.expected_size(i))
                .sum::<u64>(),
        );
        self.report(file_name, transferred, total_size);

        let mut reader = ChunkReader::new(source, total_size, self.options.chunk_size);
        let mut outstanding = VecDeque::new();

        for &index in &to_send {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            while self.options.ack_window > 0 && outstanding.len() >= self.options.ack_window {
                self.await_ack(file_name, &mut outstanding, feedback, cancel)
                    .await?;
            }

            let chunk = reader.read_chunk(index).await?;
            self.send_control(&ControlMessage::ChunkMeta(ChunkMeta {
                chunk_index: index,
                file_name: file_name.to_string(),
            }))
            .await?;
            let frame = encode_chunk_frame(index, &chunk.data)?;
            self.channel.send_binary(frame).await.map_err(channel_error)?;
            debug!(file = file_name, index, size = chunk.data.len(), "chunk sent");

            transferred += chunk.data.len() as u64;
            self.report(file_name, transferred, total_size);
            if self.options.ack_window > 0 {
                outstanding.push_back(index);
            }
        }

        while !outstanding.is_empty() {
            self.await_ack(file_name, &mut outstanding, feedback, cancel)
                .await?;
        }

        info!(
            file = file_name,
            sent = to_send.len(),
            skipped = chunks_skipped,
            "file sent"
        );
        Ok(SendReport {
            file_name: file_name.to_string(),
            total_size,
            chunks_sent: to_send.len(),
            chunks_skipped,
        })
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<(), TransferError> {
        let text = message.to_text()?;
        self.channel.send_text(text).await.map_err(channel_error)
    }

    fn report(&self, file_name: &str, transferred: u64, total: u64) {
        if let Some(tx) = &self.progress {
            let _ = tx.try_send(TransferProgress {
                file_name: file_name.to_string(),
                transferred,
                total,
            });
        }
    }

    async fn next_feedback(
        &self,
        waiting_for: impl FnOnce() -> String,
        feedback: &mut mpsc::Receiver<SenderFeedback>,
        cancel: &CancellationToken,
    ) -> Result<SenderFeedback, TransferError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            result = tokio::time::timeout(self.options.ack_timeout, feedback.recv()) => {
                match result {
                    Ok(Some(fb)) => Ok(fb),
                    Ok(None) => Err(TransferError::ChannelNotOpen),
                    Err(_) => Err(TransferError::Timeout(waiting_for())),
                }
            }
        }
    }

    async fn await_resume_state(
        &self,
        file_name: &str,
        feedback: &mut mpsc::Receiver<SenderFeedback>,
        cancel: &CancellationToken,
    ) -> Result<ResumeState, TransferError> {
        loop {
            match self
                .next_feedback(|| "resume-state".into(), feedback, cancel)
                .await?
            {
                SenderFeedback::Resume(state) if state.file_name == file_name => {
                    debug!(file = file_name, missing = state.missing_chunks.len(), "resume-state");
                    return Ok(state);
                }
                other => debug!(?other, "ignoring feedback while waiting for resume-state"),
            }
        }
    }

    /// Waits for one ack that retires an outstanding chunk.
    async fn await_ack(
        &self,
        file_name: &str,
        outstanding: &mut VecDeque<u32>,
        feedback: &mut mpsc::Receiver<SenderFeedback>,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let oldest = outstanding.front().copied().unwrap_or_default();
        loop {
            let fb = self
                .next_feedback(|| format!("chunk-ack for chunk {oldest}"), feedback, cancel)
                .await?;
            let SenderFeedback::Ack(ack) = fb else {
                continue;
            };
            if ack.file_name != file_name {
                continue;
            }
            if !ack.received {
                return Err(TransferError::Rejected(ack.chunk_index));
            }
            if let Some(pos) = outstanding.iter().position(|&i| i == ack.chunk_index) {
                outstanding.remove(pos);
                return Ok(());
            }
            debug!(index = ack.chunk_index, "ack for chunk not in flight");
        }
    }
}

fn channel_error(e: DataChannelError) -> TransferError {
    match e {
        DataChannelError::NotOpen => TransferError::ChannelNotOpen,
        other => TransferError::Channel(other),
    }
}
