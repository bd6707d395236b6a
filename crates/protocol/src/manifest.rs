use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Errors produced when building or validating a manifest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("file name is empty")]
    EmptyFileName,

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("file needs {0} chunks, more than the protocol can index")]
    TooManyChunks(u64),

    #[error("manifest lists {actual} chunks, expected {expected}")]
    ChunkCountMismatch { expected: usize, actual: usize },

    #[error("chunk entry {position} is inconsistent with the manifest sizes")]
    ChunkMismatch { position: usize },
}

/// Per-chunk receive status recorded in a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Received,
}

/// One entry of [`Manifest::chunks`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEntry {
    pub index: u32,
    pub size: u64,
    #[serde(default)]
    pub status: ChunkStatus,
}

/// Structured description of one file transfer, sent before any chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub file_name: String,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Creation time, RFC 3339 / ISO-8601.
    pub timestamp: String,
    pub chunks: Vec<ChunkEntry>,
    /// Hex SHA-256 of the whole file. Empty means "not verified".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}

impl Manifest {
    /// Plans the chunk layout for a file of `total_size` bytes.
    ///
    /// Every chunk but the last is exactly `chunk_size` bytes; the last one
    /// holds the remainder. A zero-byte file has no chunks.
    pub fn plan(
        file_name: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Self, ManifestError> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(ManifestError::EmptyFileName);
        }
        let count = chunk_count(total_size, chunk_size)?;

        let chunks = (0..count)
            .map(|index| ChunkEntry {
                index: index as u32,
                size: chunk_len(total_size, chunk_size, index as u64),
                status: ChunkStatus::Pending,
            })
            .collect();

        Ok(Self {
            file_name,
            total_size,
            chunk_size,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            chunks,
            sha256: String::new(),
        })
    }

    /// Attaches a whole-file SHA-256 digest.
    pub fn with_checksum(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = sha256.into();
        self
    }

    /// Number of chunks in this transfer.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Expected byte length of chunk `index`, or `None` if out of range.
    pub fn expected_size(&self, index: u32) -> Option<u64> {
        self.chunks.get(index as usize).map(|c| c.size)
    }

    /// Byte offset of chunk `index` within the file.
    pub fn chunk_offset(&self, index: u32) -> u64 {
        u64::from(index) * self.chunk_size
    }

    /// Returns `true` if `other` describes the same byte layout, which is
    /// what resuming from persisted chunks requires.
    pub fn same_layout(&self, other: &Manifest) -> bool {
        self.file_name == other.file_name
            && self.total_size == other.total_size
            && self.chunk_size == other.chunk_size
            && self.chunks.len() == other.chunks.len()
    }

    /// Checks the chunk arithmetic invariants of a received manifest.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.file_name.is_empty() {
            return Err(ManifestError::EmptyFileName);
        }
        let expected = chunk_count(self.total_size, self.chunk_size)?;
        if self.chunks.len() != expected {
            return Err(ManifestError::ChunkCountMismatch {
                expected,
                actual: self.chunks.len(),
            });
        }
        for (position, entry) in self.chunks.iter().enumerate() {
            let size = chunk_len(self.total_size, self.chunk_size, position as u64);
            if entry.index as usize != position || entry.size != size {
                return Err(ManifestError::ChunkMismatch { position });
            }
        }
        Ok(())
    }
}

/// `ceil(total_size / chunk_size)`, checked against the `u32` index space.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> Result<usize, ManifestError> {
    if chunk_size == 0 {
        return Err(ManifestError::ZeroChunkSize);
    }
    let count = total_size.div_ceil(chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(ManifestError::TooManyChunks(count));
    }
    Ok(count as usize)
}

/// Length of chunk `index`: `total - index*chunk`, clamped to `[0, chunk]`.
pub fn chunk_len(total_size: u64, chunk_size: u64, index: u64) -> u64 {
    total_size
        .saturating_sub(index.saturating_mul(chunk_size))
        .min(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_splits_40000_bytes_into_three_chunks() {
        let m = Manifest::plan("a.bin", 40_000, 16_384).unwrap();
        let sizes: Vec<u64> = m.chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![16_384, 16_384, 7_232]);
        assert_eq!(m.chunk_count(), 3);
        assert!(m.chunks.iter().all(|c| c.status == ChunkStatus::Pending));
    }

    #[test]
    fn plan_invariants_hold_for_many_sizes() {
        for chunk in [1u64, 7, 16_384] {
            for total in [0u64, 1, 6, 7, 8, 16_383, 16_384, 16_385, 100_000] {
                let m = Manifest::plan("f", total, chunk).unwrap();
                assert_eq!(m.chunk_count() as u64, total.div_ceil(chunk));
                assert_eq!(m.chunks.iter().map(|c| c.size).sum::<u64>(), total);
                if let Some((_, head)) = m.chunks.split_last() {
                    assert!(head.iter().all(|c| c.size == chunk));
                }
                m.validate().unwrap();
            }
        }
    }

    #[test]
    fn plan_exact_multiple_has_full_last_chunk() {
        let m = Manifest::plan("f", 32_768, 16_384).unwrap();
        assert_eq!(m.chunk_count(), 2);
        assert_eq!(m.expected_size(1), Some(16_384));
        assert_eq!(m.expected_size(2), None);
        assert_eq!(m.chunk_offset(1), 16_384);
    }

    #[test]
    fn plan_rejects_zero_chunk_size() {
        assert_eq!(
            Manifest::plan("f", 10, 0).unwrap_err(),
            ManifestError::ZeroChunkSize
        );
    }

    #[test]
    fn plan_rejects_empty_name() {
        assert_eq!(
            Manifest::plan("", 10, 4).unwrap_err(),
            ManifestError::EmptyFileName
        );
    }

    #[test]
    fn chunk_len_clamps_past_end() {
        assert_eq!(chunk_len(10, 4, 2), 2);
        assert_eq!(chunk_len(10, 4, 3), 0);
        assert_eq!(chunk_len(10, 4, u64::MAX), 0);
    }

    #[test]
    fn validate_detects_tampered_chunk_list() {
        let mut m = Manifest::plan("f", 10, 4).unwrap();
        m.chunks.pop();
        assert!(matches!(
            m.validate(),
            Err(ManifestError::ChunkCountMismatch {
                expected: 3,
                actual: 2
            })
        ));

        let mut m = Manifest::plan("f", 10, 4).unwrap();
        m.chunks[1].size = 3;
        assert_eq!(
            m.validate(),
            Err(ManifestError::ChunkMismatch { position: 1 })
        );
    }

    #[test]
    fn json_uses_camel_case_and_omits_empty_checksum() {
        let m = Manifest::plan("a.bin", 5, 4).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"fileName\":\"a.bin\""));
        assert!(json.contains("\"totalSize\":5"));
        assert!(json.contains("\"chunkSize\":4"));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("sha256"));

        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let m = Manifest::plan("a.bin", 1, 1).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&m.timestamp).is_ok());
        assert!(m.timestamp.ends_with('Z'));
    }

    #[test]
    fn same_layout_ignores_timestamp_and_status() {
        let a = Manifest::plan("a.bin", 100, 10).unwrap();
        let mut b = a.clone();
        b.timestamp = "2020-01-01T00:00:00.000Z".into();
        b.chunks[0].status = ChunkStatus::Received;
        assert!(a.same_layout(&b));

        let c = Manifest::plan("a.bin", 101, 10).unwrap();
        assert!(!a.same_layout(&c));
    }
}
