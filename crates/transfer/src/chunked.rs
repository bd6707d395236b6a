use std::io::SeekFrom;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use peerdrop_protocol::CHUNK_SIZE;
use peerdrop_protocol::manifest::chunk_len;

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub async fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// One chunk read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Reads a byte source in fixed-size chunks.
///
/// Each read completes before the next one starts; the caller sends a
/// chunk before asking for the next.
pub struct ChunkReader<R> {
    source: R,
    chunk_size: u64,
    total_size: u64,
    offset: u64,
    index: u32,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `source`, which must yield exactly `total_size` bytes.
    ///
    /// If `chunk_size` is 0, [`CHUNK_SIZE`] is used.
    pub fn new(source: R, total_size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            source,
            chunk_size: chunk_size as u64,
            total_size,
            offset: 0,
            index: 0,
        }
    }

    /// Reads the next chunk. Returns `None` once `total_size` bytes were read.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let len = chunk_len(self.total_size, self.chunk_size, u64::from(self.index));
        if len == 0 {
            return Ok(None);
        }

        let mut data = vec![0u8; len as usize];
        self.source.read_exact(&mut data).await?;

        let chunk = Chunk {
            index: self.index,
            data,
        };
        self.offset += len;
        self.index += 1;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.total_size - self.offset
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> ChunkReader<R> {
    /// Reads chunk `index`, seeking first if the cursor is elsewhere.
    pub async fn read_chunk(&mut self, index: u32) -> Result<Chunk, TransferError> {
        if index != self.index {
            let offset = u64::from(index) * self.chunk_size;
            self.source.seek(SeekFrom::Start(offset)).await?;
            self.offset = offset.min(self.total_size);
            self.index = index;
        }
        self.next_chunk()
            .await?
            .ok_or(TransferError::ChunkOutOfRange(index))
    }
}
