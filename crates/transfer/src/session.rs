use std::time::{Duration, Instant};

use peerdrop_protocol::{ChunkStatus, Manifest};

use crate::TransferError;
use crate::format::progress_percent;

/// Lifecycle of a receive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Stopped in place after a persistence failure; resumable later.
    Paused,
    Completed,
}

/// Result of storing a chunk in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    /// The index was already present; nothing changed.
    Duplicate,
}

/// Byte-level progress of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub file_name: String,
    pub transferred: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Rounded completion percentage.
    pub fn percent(&self) -> u8 {
        progress_percent(self.transferred, self.total)
    }
}

/// Receiver-side record of one file transfer.
///
/// Each slot is `None` until its chunk is received, so a received
/// zero-length chunk is still distinguishable from a missing one.
/// `received_bytes` always equals the summed length of the filled slots.
#[derive(Debug)]
pub struct TransferSession {
    manifest: Manifest,
    chunks: Vec<Option<Vec<u8>>>,
    received_bytes: u64,
    status: SessionStatus,
    started_at: Instant,
}

impl TransferSession {
    /// A fresh session with every chunk missing.
    pub fn new(manifest: Manifest) -> Self {
        let count = manifest.chunk_count();
        Self::resumed(manifest, vec![None; count])
    }

    /// A session seeded with chunks recovered from storage.
    ///
    /// Slots beyond the manifest's chunk count are ignored and missing slots
    /// are padded with `None`.
    pub fn resumed(mut manifest: Manifest, mut chunks: Vec<Option<Vec<u8>>>) -> Self {
        chunks.resize(manifest.chunk_count(), None);
        let received_bytes = chunks.iter().flatten().map(|c| c.len() as u64).sum();
        for (entry, slot) in manifest.chunks.iter_mut().zip(&chunks) {
            entry.status = if slot.is_some() {
                ChunkStatus::Received
            } else {
                ChunkStatus::Pending
            };
        }

        let mut session = Self {
            manifest,
            chunks,
            received_bytes,
            status: SessionStatus::Active,
            started_at: Instant::now(),
        };
        if session.is_complete() {
            session.status = SessionStatus::Completed;
        }
        session
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn file_name(&self) -> &str {
        &self.manifest.file_name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Number of chunks received so far.
    pub fn received_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_received(&self, index: u32) -> bool {
        matches!(self.chunks.get(index as usize), Some(Some(_)))
    }

    /// Indices still missing, ascending.
    pub fn missing_chunks(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Returns `true` once no slot is empty.
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Option::is_some)
    }

    /// Checks that `len` bytes are a valid payload for chunk `index`.
    pub fn check_chunk(&self, index: u32, len: usize) -> Result<(), TransferError> {
        let expected = self
            .manifest
            .expected_size(index)
            .ok_or(TransferError::ChunkOutOfRange(index))?;
        if expected != len as u64 {
            return Err(TransferError::ChunkSizeMismatch {
                index,
                expected,
                actual: len as u64,
            });
        }
        Ok(())
    }

    /// Stores chunk `index`.
    ///
    /// A second copy of an index is reported as a duplicate and not
    /// counted again.
    pub fn insert(&mut self, index: u32, data: Vec<u8>) -> Result<InsertOutcome, TransferError> {
        self.check_chunk(index, data.len())?;

        let slot = &mut self.chunks[index as usize];
        if slot.is_some() {
            return Ok(InsertOutcome::Duplicate);
        }
        self.received_bytes += data.len() as u64;
        *slot = Some(data);
        self.manifest.chunks[index as usize].status = ChunkStatus::Received;

        if self.is_complete() {
            self.status = SessionStatus::Completed;
        }
        Ok(InsertOutcome::Stored)
    }

    /// Stops the session in place; chunks already held are kept.
    pub fn pause(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Paused;
        }
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            file_name: self.manifest.file_name.clone(),
            transferred: self.received_bytes,
            total: self.manifest.total_size,
        }
    }

    /// Concatenates all chunks in index order.
    ///
    /// Missing chunks contribute nothing; callers check [`is_complete`]
    /// first.
    ///
    /// [`is_complete`]: Self::is_complete
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.received_bytes as usize);
        for chunk in self.chunks.iter().flatten() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Time since the session was opened.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(total: u64, chunk: u64) -> Manifest {
        Manifest::plan("a.bin", total, chunk).unwrap()
    }

    #[test]
    fn new_session_is_empty_and_active() {
        let s = TransferSession::new(manifest(10, 4));
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.received_bytes(), 0);
        assert_eq!(s.missing_chunks(), vec![0, 1, 2]);
        assert!(!s.is_complete());
    }

    #[test]
    fn insert_counts_bytes_and_completes() {
        let mut s = TransferSession::new(manifest(10, 4));
        assert_eq!(s.insert(2, b"ij".to_vec()).unwrap(), InsertOutcome::Stored);
        assert_eq!(s.insert(0, b"abcd".to_vec()).unwrap(), InsertOutcome::Stored);
        assert_eq!(s.received_bytes(), 6);
        assert_eq!(s.missing_chunks(), vec![1]);
        assert_eq!(s.progress().percent(), 60);

        s.insert(1, b"efgh".to_vec()).unwrap();
        assert!(s.is_complete());
        assert_eq!(s.status(), SessionStatus::Completed);
        assert_eq!(s.assemble(), b"abcdefghij");
        assert!(
            s.manifest()
                .chunks
                .iter()
                .all(|c| c.status == ChunkStatus::Received)
        );
    }

    #[test]
    fn duplicate_chunk_is_not_double_counted() {
        let mut s = TransferSession::new(manifest(10, 4));
        s.insert(0, b"abcd".to_vec()).unwrap();
        assert_eq!(
            s.insert(0, b"abcd".to_vec()).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(s.received_bytes(), 4);
        assert_eq!(s.received_count(), 1);
    }

    #[test]
    fn rejects_wrong_size_and_out_of_range() {
        let mut s = TransferSession::new(manifest(10, 4));
        assert!(matches!(
            s.insert(0, b"abc".to_vec()),
            Err(TransferError::ChunkSizeMismatch {
                index: 0,
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            s.insert(3, Vec::new()),
            Err(TransferError::ChunkOutOfRange(3))
        ));
        assert_eq!(s.received_bytes(), 0);
    }

    #[test]
    fn resumed_recomputes_received_bytes() {
        let chunks = vec![Some(vec![0u8; 16_384])];
        let s = TransferSession::resumed(manifest(40_000, 16_384), chunks);
        assert_eq!(s.received_bytes(), 16_384);
        assert_eq!(s.missing_chunks(), vec![1, 2]);
        assert!(s.is_received(0));
        assert!(!s.is_received(1));
        assert_eq!(s.manifest().chunks[0].status, ChunkStatus::Received);
        assert_eq!(s.manifest().chunks[1].status, ChunkStatus::Pending);
    }

    #[test]
    fn zero_chunk_session_is_complete_immediately() {
        let s = TransferSession::new(manifest(0, 4));
        assert!(s.is_complete());
        assert_eq!(s.status(), SessionStatus::Completed);
        assert!(s.assemble().is_empty());
        assert_eq!(s.progress().percent(), 100);
    }

    #[test]
    fn pause_keeps_chunks() {
        let mut s = TransferSession::new(manifest(10, 4));
        s.insert(0, b"abcd".to_vec()).unwrap();
        s.pause();
        assert_eq!(s.status(), SessionStatus::Paused);
        assert_eq!(s.received_bytes(), 4);
    }

    #[test]
    fn progress_is_monotonic_as_chunks_arrive() {
        let mut s = TransferSession::new(manifest(40_000, 16_384));
        let mut last = s.progress().percent();
        for (i, len) in [16_384usize, 16_384, 7_232].into_iter().enumerate() {
            s.insert(i as u32, vec![1; len]).unwrap();
            let pct = s.progress().percent();
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(last, 100);
    }
}
