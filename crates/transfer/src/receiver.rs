//! Receiving side of a transfer: one session per data channel.
//!
//! The [`Receiver`] is a plain state machine. Each inbound message yields a
//! [`Reaction`] holding the events to surface and an optional control
//! reply; the owner of the channel sends the reply and routes the events.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use peerdrop_protocol::{
    ChunkAck, ChunkMeta, ControlMessage, MAX_FILE_SIZE, Manifest, ResumeState, decode_chunk_frame,
};

use crate::chunked::checksum_bytes;
use crate::session::{InsertOutcome, SessionStatus, TransferProgress, TransferSession};
use crate::store::ResumeStore;
use crate::validation::validate_file_name;

/// What to do with a stored partial transfer of the same file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    #[default]
    Resume,
    Restart,
}

/// Where a completed file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Saved(PathBuf),
    /// No store is configured; the caller owns the bytes.
    InMemory(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_name: String,
    pub size: u64,
    pub artifact: Artifact,
}

/// Something the receiver wants surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    Started {
        file_name: String,
        total_size: u64,
        resumed_chunks: usize,
        resumed_bytes: u64,
    },
    Progress(TransferProgress),
    Completed(ReceivedFile),
    /// Persistence failed; chunks already on disk stay resumable.
    Paused { file_name: String, reason: String },
    Failed { file_name: String, reason: String },
    /// An inbound message was discarded as a protocol violation.
    Dropped { reason: String },
}

/// Outcome of handling one inbound message.
#[derive(Debug, Default)]
pub struct Reaction {
    pub events: Vec<ReceiveEvent>,
    pub reply: Option<ControlMessage>,
}

impl Reaction {
    fn dropped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "inbound message dropped");
        Self {
            events: vec![ReceiveEvent::Dropped { reason }],
            reply: None,
        }
    }

    fn with_reply(mut self, reply: ControlMessage) -> Self {
        self.reply = Some(reply);
        self
    }
}

fn ack(file_name: &str, chunk_index: u32, received: bool) -> ControlMessage {
    ControlMessage::ChunkAck(ChunkAck {
        chunk_index,
        file_name: file_name.to_string(),
        received,
    })
}

/// Chunk receiver and reassembler for one channel.
pub struct Receiver {
    store: Option<ResumeStore>,
    mode: ResumeMode,
    max_file_size: u64,
    session: Option<TransferSession>,
    /// Index announced by the last `chunk-meta`, consumed by the next binary.
    pending: Option<u32>,
}

impl Receiver {
    /// Without a store, completed files are handed back in memory and
    /// nothing is resumable.
    pub fn new(store: Option<ResumeStore>, mode: ResumeMode) -> Self {
        Self {
            store,
            mode,
            max_file_size: MAX_FILE_SIZE,
            session: None,
            pending: None,
        }
    }

    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = max;
        self
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    /// Handles an inbound manifest.
    ///
    /// Replaces any session in progress, resumes from the store when
    /// allowed, and replies with the chunks still missing.
    pub async fn on_manifest(&mut self, manifest: Manifest) -> Reaction {
        let file_name = manifest.file_name.clone();
        self.pending = None;

        let checked = manifest
            .validate()
            .map_err(|e| e.to_string())
            .and_then(|()| validate_file_name(&file_name).map_err(|e| e.to_string()));
        let checked = checked.and_then(|()| {
            if manifest.total_size > self.max_file_size {
                Err(format!(
                    "file is too large ({} bytes, max {})",
                    manifest.total_size, self.max_file_size
                ))
            } else {
                Ok(())
            }
        });
        if let Err(reason) = checked {
            warn!(file = %file_name, %reason, "rejecting manifest");
            return Reaction {
                events: vec![ReceiveEvent::Failed { file_name, reason }],
                reply: None,
            };
        }

        if let Some(old) = self.session.take() {
            info!(
                old = old.file_name(),
                new = %file_name,
                "new manifest replaces the transfer in progress"
            );
        }

        let mut session = self.open_session(manifest).await;
        let mut events = vec![ReceiveEvent::Started {
            file_name: file_name.clone(),
            total_size: session.manifest().total_size,
            resumed_chunks: session.received_count(),
            resumed_bytes: session.received_bytes(),
        }];

        if let Some(store) = &self.store {
            if let Err(e) = store.write_manifest(session.manifest()).await {
                warn!(file = %file_name, error = %e, "failed to persist manifest, pausing");
                session.pause();
                events.push(ReceiveEvent::Paused {
                    file_name: file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            file = %file_name,
            total = session.manifest().total_size,
            chunks = session.manifest().chunk_count(),
            have = session.received_count(),
            "receiving file"
        );

        let reply = ControlMessage::ResumeState(ResumeState {
            file_name,
            missing_chunks: session.missing_chunks(),
        });
        let complete = session.is_complete() && session.status() != SessionStatus::Paused;
        self.session = Some(session);
        if complete {
            events.extend(self.finish().await);
        }

        Reaction {
            events,
            reply: Some(reply),
        }
    }

    async fn open_session(&self, manifest: Manifest) -> TransferSession {
        let Some(store) = &self.store else {
            return TransferSession::new(manifest);
        };
        let file_name = manifest.file_name.clone();

        let existing = match store.read_existing(&file_name).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(file = %file_name, error = %e, "stored transfer unreadable, discarding");
                self.discard(store, &file_name).await;
                None
            }
        };
        let Some(existing) = existing else {
            return TransferSession::new(manifest);
        };

        let checksum_matches = existing.manifest.sha256.is_empty()
            || manifest.sha256.is_empty()
            || existing.manifest.sha256 == manifest.sha256;
        if self.mode == ResumeMode::Resume
            && existing.manifest.same_layout(&manifest)
            && checksum_matches
        {
            info!(
                file = %file_name,
                chunks = existing.recovered_count(),
                bytes = existing.recovered_bytes,
                "resuming stored transfer"
            );
            return TransferSession::resumed(manifest, existing.chunks);
        }

        info!(file = %file_name, mode = ?self.mode, "discarding stored transfer");
        self.discard(store, &file_name).await;
        TransferSession::new(manifest)
    }

    async fn discard(&self, store: &ResumeStore, file_name: &str) {
        if let Err(e) = store.abandon(file_name).await {
            warn!(file = file_name, error = %e, "failed to remove stored artifacts");
        }
    }

    /// Handles an inbound `chunk-meta`.
    pub fn on_chunk_meta(&mut self, meta: ChunkMeta) -> Reaction {
        match &self.session {
            Some(session) if session.file_name() == meta.file_name => {
                if let Some(stale) = self.pending.replace(meta.chunk_index) {
                    warn!(stale, next = meta.chunk_index, "chunk-meta without binary");
                }
                Reaction::default()
            }
            Some(_) => Reaction::dropped(format!(
                "chunk-meta for {} does not match the active transfer",
                meta.file_name
            )),
            None => Reaction::dropped(format!(
                "chunk-meta for {} without a manifest",
                meta.file_name
            )),
        }
    }

    /// Handles an inbound binary message: a framed chunk.
    ///
    /// A chunk is acknowledged only after it has been persisted.
    pub async fn on_binary(&mut self, data: &[u8]) -> Reaction {
        let Some(pending) = self.pending.take() else {
            return Reaction::dropped("binary message without preceding chunk-meta");
        };
        let (index, payload) = match decode_chunk_frame(data) {
            Ok(frame) => frame,
            Err(e) => return Reaction::dropped(format!("chunk {pending}: {e}")),
        };
        if index != pending {
            return Reaction::dropped(format!(
                "frame carries chunk {index} but chunk-meta announced {pending}"
            ));
        }
        let Some(session) = self.session.as_mut() else {
            return Reaction::dropped(format!("chunk {index} without an active transfer"));
        };
        let file_name = session.file_name().to_string();

        if session.status() == SessionStatus::Paused {
            return Reaction::dropped(format!("chunk {index} arrived while {file_name} is paused"))
                .with_reply(ack(&file_name, index, false));
        }
        if let Err(e) = session.check_chunk(index, payload.len()) {
            return Reaction::dropped(e.to_string()).with_reply(ack(&file_name, index, false));
        }
        if session.is_received(index) {
            debug!(file = %file_name, index, "duplicate chunk");
            return Reaction::default().with_reply(ack(&file_name, index, true));
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.write_chunk(&file_name, index, payload).await {
                warn!(file = %file_name, index, error = %e, "failed to persist chunk, pausing");
                session.pause();
                return Reaction {
                    events: vec![ReceiveEvent::Paused {
                        file_name: file_name.clone(),
                        reason: e.to_string(),
                    }],
                    reply: Some(ack(&file_name, index, false)),
                };
            }
        }

        match session.insert(index, payload.to_vec()) {
            Ok(InsertOutcome::Stored) => {}
            Ok(InsertOutcome::Duplicate) => {
                return Reaction::default().with_reply(ack(&file_name, index, true));
            }
            Err(e) => {
                return Reaction::dropped(e.to_string()).with_reply(ack(&file_name, index, false));
            }
        }
        debug!(file = %file_name, index, size = payload.len(), "chunk stored");

        let mut events = vec![ReceiveEvent::Progress(session.progress())];
        let complete = session.is_complete();
        if complete {
            events.extend(self.finish().await);
        }
        Reaction {
            events,
            reply: Some(ack(&file_name, index, true)),
        }
    }

    /// Reassembles, verifies, and hands off the completed session.
    async fn finish(&mut self) -> Vec<ReceiveEvent> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        self.pending = None;
        let file_name = session.file_name().to_string();
        let expected = session.manifest().sha256.clone();
        let data = session.assemble();

        if !expected.is_empty() && checksum_bytes(&data) != expected {
            warn!(file = %file_name, "checksum mismatch, discarding transfer");
            if let Some(store) = &self.store {
                self.discard(store, &file_name).await;
            }
            return vec![ReceiveEvent::Failed {
                file_name,
                reason: "checksum mismatch".into(),
            }];
        }

        let size = data.len() as u64;
        let artifact = match &self.store {
            Some(store) => match store.finalize(&file_name, &data).await {
                Ok(path) => Artifact::Saved(path),
                Err(e) => {
                    warn!(file = %file_name, error = %e, "failed to finalize transfer");
                    return vec![ReceiveEvent::Paused {
                        file_name,
                        reason: e.to_string(),
                    }];
                }
            },
            None => Artifact::InMemory(data),
        };

        info!(
            file = %file_name,
            size,
            elapsed_ms = session.elapsed().as_millis() as u64,
            "file received"
        );
        vec![ReceiveEvent::Completed(ReceivedFile {
            file_name,
            size,
            artifact,
        })]
    }
}
