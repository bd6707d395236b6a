//! On-disk persistence of partial transfers.
//!
//! Completed files land directly in the store directory. Everything else
//! lives in its `.partial/` subdirectory: a `<name>.manifest` JSON file
//! plus one `<name>.chunk.<index>` file per received chunk. Artifacts are
//! written to a `.part` sibling first and renamed into place, so a crash
//! never leaves a truncated artifact under its final name. Names chosen by
//! the remote peer therefore never collide with artifact names.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use peerdrop_protocol::Manifest;
use peerdrop_protocol::constants::{CHUNK_INFIX, MANIFEST_SUFFIX};

use crate::TransferError;
use crate::validation::validate_file_name;

/// Subdirectory of the store root holding manifests and chunks.
pub(crate) const ARTIFACT_DIR: &str = ".partial";

const PART_SUFFIX: &str = ".part";

/// Suffix of a completed file while it is being written.
const ASSEMBLING_SUFFIX: &str = ".download";

/// A partial transfer recovered from disk.
#[derive(Debug)]
pub struct ExistingTransfer {
    pub manifest: Manifest,
    /// One slot per manifest chunk; `None` where no usable chunk file exists.
    pub chunks: Vec<Option<Vec<u8>>>,
    /// Summed length of the recovered chunks.
    pub recovered_bytes: u64,
}

impl ExistingTransfer {
    /// Number of chunks recovered.
    pub fn recovered_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }
}

/// Persistence manager scoped to one directory.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    root: PathBuf,
    artifacts: PathBuf,
}

impl ResumeStore {
    /// Opens `root`, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(path = %root.display(), "resume store opened");
        let artifacts = root.join(ARTIFACT_DIR);
        Ok(Self { root, artifacts })
    }

    /// Where completed files are written.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where manifests and chunks of unfinished transfers are kept.
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts
    }

    fn manifest_path(&self, file_name: &str) -> PathBuf {
        self.artifacts.join(format!("{file_name}{MANIFEST_SUFFIX}"))
    }

    fn chunk_path(&self, file_name: &str, index: u32) -> PathBuf {
        self.artifacts.join(format!("{file_name}{CHUNK_INFIX}{index}"))
    }

    /// Creates the artifact directory. Fails if the root itself is gone.
    async fn ensure_artifacts_dir(&self) -> Result<(), TransferError> {
        match fs::create_dir(&self.artifacts).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `<name>.manifest`.
    pub async fn write_manifest(&self, manifest: &Manifest) -> Result<(), TransferError> {
        validate_file_name(&manifest.file_name)?;
        let json = serde_json::to_vec_pretty(manifest)?;
        self.ensure_artifacts_dir().await?;
        write_atomic(&self.manifest_path(&manifest.file_name), &json).await
    }

    /// Writes `<name>.chunk.<index>`.
    pub async fn write_chunk(
        &self,
        file_name: &str,
        index: u32,
        data: &[u8],
    ) -> Result<(), TransferError> {
        validate_file_name(file_name)?;
        self.ensure_artifacts_dir().await?;
        write_atomic(&self.chunk_path(file_name, index), data).await
    }

    /// Loads a stored transfer for `file_name`.
    ///
    /// Returns `Ok(None)` when no manifest exists. A chunk file that is
    /// missing, unreadable or of the wrong size counts as not received.
    pub async fn read_existing(
        &self,
        file_name: &str,
    ) -> Result<Option<ExistingTransfer>, TransferError> {
        validate_file_name(file_name)?;

        let raw = match fs::read(self.manifest_path(file_name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&raw)?;
        manifest.validate()?;

        let mut chunks = Vec::with_capacity(manifest.chunk_count());
        let mut recovered_bytes = 0u64;
        for entry in &manifest.chunks {
            let slot = match fs::read(self.chunk_path(file_name, entry.index)).await {
                Ok(data) if data.len() as u64 == entry.size => {
                    recovered_bytes += entry.size;
                    Some(data)
                }
                Ok(data) => {
                    warn!(
                        file = file_name,
                        index = entry.index,
                        expected = entry.size,
                        actual = data.len(),
                        "stored chunk has wrong size, ignoring"
                    );
                    None
                }
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => {
                    warn!(file = file_name, index = entry.index, error = %e, "unreadable stored chunk");
                    None
                }
            };
            chunks.push(slot);
        }

        Ok(Some(ExistingTransfer {
            manifest,
            chunks,
            recovered_bytes,
        }))
    }

    /// Writes the assembled file to `<root>/<name>` and removes its
    /// intermediate artifacts.
    pub async fn finalize(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, TransferError> {
        validate_file_name(file_name)?;
        self.ensure_artifacts_dir().await?;

        let temp_path = self
            .artifacts
            .join(format!("{file_name}{ASSEMBLING_SUFFIX}"));
        write_synced(&temp_path, data).await?;
        let path = self.root.join(file_name);
        fs::rename(&temp_path, &path).await?;

        self.abandon(file_name).await?;
        info!(path = %path.display(), size = data.len(), "transfer finalized");
        Ok(path)
    }

    /// Deletes the manifest and every chunk artifact for `file_name`.
    ///
    /// Completed files in the root are never touched. The artifact
    /// directory is removed once it is empty.
    pub async fn abandon(&self, file_name: &str) -> Result<(), TransferError> {
        validate_file_name(file_name)?;

        remove_if_exists(&self.manifest_path(file_name)).await?;
        remove_if_exists(&with_part_suffix(&self.manifest_path(file_name))).await?;
        remove_if_exists(
            &self
                .artifacts
                .join(format!("{file_name}{ASSEMBLING_SUFFIX}")),
        )
        .await?;

        let prefix = format!("{file_name}{CHUNK_INFIX}");
        let mut removed = 0usize;
        let mut entries = match fs::read_dir(&self.artifacts).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_chunk_artifact(name, &prefix) {
                remove_if_exists(&entry.path()).await?;
                removed += 1;
            }
        }

        debug!(file = file_name, removed, "transfer artifacts removed");

        // Only succeeds once no transfer has artifacts left.
        let _ = fs::remove_dir(&self.artifacts).await;
        Ok(())
    }

    /// File names that have a stored manifest, sorted.
    pub async fn pending_transfers(&self) -> Result<Vec<String>, TransferError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.artifacts).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(MANIFEST_SUFFIX)) else {
                continue;
            };
            if validate_file_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// `<prefix><digits>` or `<prefix><digits>.part`.
fn is_chunk_artifact(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let digits = rest.strip_suffix(PART_SUFFIX).unwrap_or(rest);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn with_part_suffix(path: &Path) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(PART_SUFFIX);
    PathBuf::from(os)
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), TransferError> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), TransferError> {
    let temp_path = with_part_suffix(path);
    write_synced(&temp_path, data).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), TransferError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
