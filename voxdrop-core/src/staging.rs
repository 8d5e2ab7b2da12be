//! Staging of payloads between the caller and the transfer engine.
//!
//! A staged artifact is the single copy every transfer attempt re-reads. Small
//! payloads stay in memory; large ones are spilled to a temp file so the
//! caller's buffer can be dropped while retries run.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::{StagingConfig, UploadResult};

/// Persists payloads so transfer attempts can replay them
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Copy the payload into ephemeral storage
    async fn stage(&self, payload: Bytes) -> UploadResult<StagedArtifact>;

    /// Number of artifacts staged and not yet released
    fn live(&self) -> usize;
}

/// Where an artifact's bytes are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingKind {
    Memory,
    Disk,
}

enum Backing {
    Memory(Bytes),
    Disk(TempPath),
}

/// Decrements the owning store's live count exactly once
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusively owned handle to a staged payload.
///
/// Backing storage is removed by [`StagedArtifact::release`] or, if that was
/// never called, when the handle is dropped.
pub struct StagedArtifact {
    backing: Option<Backing>,
    size_bytes: u64,
    _live: LiveGuard,
}

impl StagedArtifact {
    /// Byte length of the payload
    pub fn len(&self) -> u64 {
        self.size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    pub fn kind(&self) -> StagingKind {
        match self.backing {
            Some(Backing::Disk(_)) => StagingKind::Disk,
            _ => StagingKind::Memory,
        }
    }

    /// Path of the spill file, for disk-backed artifacts
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Some(Backing::Disk(path)) => Some(&**path),
            _ => None,
        }
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Reads past the end are clamped; an offset at or beyond the end yields
    /// an empty buffer.
    pub async fn read_range(&self, offset: u64, len: u64) -> std::io::Result<Bytes> {
        let start = offset.min(self.size_bytes);
        let end = offset.saturating_add(len).min(self.size_bytes);
        if start == end {
            return Ok(Bytes::new());
        }

        match &self.backing {
            Some(Backing::Memory(bytes)) => Ok(bytes.slice(start as usize..end as usize)),
            Some(Backing::Disk(path)) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "staged artifact already released",
            )),
        }
    }

    /// Read the whole payload
    pub async fn read_all(&self) -> std::io::Result<Bytes> {
        self.read_range(0, self.size_bytes).await
    }

    /// Delete the backing storage
    pub fn release(mut self) -> std::io::Result<()> {
        match self.backing.take() {
            Some(Backing::Disk(path)) => {
                debug!(path = %path.display(), "releasing spilled payload");
                path.close()
            }
            Some(Backing::Memory(_)) | None => Ok(()),
        }
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if let Some(Backing::Disk(path)) = self.backing.take() {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                warn!(path = %shown, error = %e, "failed to remove spilled payload");
            }
        }
    }
}

impl std::fmt::Debug for StagedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedArtifact")
            .field("kind", &self.kind())
            .field("size_bytes", &self.size_bytes)
            .field("path", &self.path())
            .finish()
    }
}

/// Memory below a size threshold, temp files at or above it
#[derive(Debug, Clone)]
pub struct TieredStagingStore {
    config: StagingConfig,
    live: Arc<AtomicUsize>,
}

impl TieredStagingStore {
    pub fn new(config: StagingConfig) -> Self {
        Self {
            config,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep every payload in memory
    pub fn memory_only() -> Self {
        Self::new(StagingConfig::default().with_memory_threshold(u64::MAX))
    }

    /// Spill every payload to `dir`
    pub fn disk_only<P: Into<std::path::PathBuf>>(dir: P) -> Self {
        Self::new(
            StagingConfig::default()
                .with_memory_threshold(0)
                .with_spill_dir(dir),
        )
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    async fn spill(&self, payload: &Bytes) -> std::io::Result<TempPath> {
        let dir = self.config.spill_dir();
        let file = tempfile::Builder::new()
            .prefix("voxdrop-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        let path = file.into_temp_path();
        tokio::fs::write(&path, payload).await?;
        Ok(path)
    }
}

impl Default for TieredStagingStore {
    fn default() -> Self {
        Self::new(StagingConfig::default())
    }
}

#[async_trait]
impl StagingStore for TieredStagingStore {
    async fn stage(&self, payload: Bytes) -> UploadResult<StagedArtifact> {
        let size_bytes = payload.len() as u64;

        let backing = if size_bytes < self.config.memory_threshold_bytes {
            Backing::Memory(payload)
        } else {
            let path = self.spill(&payload).await?;
            debug!(path = %path.display(), size_bytes, "spilled payload to disk");
            Backing::Disk(path)
        };

        Ok(StagedArtifact {
            backing: Some(backing),
            size_bytes,
            _live: LiveGuard::acquire(&self.live),
        })
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn small_payloads_stay_in_memory() {
        let store = TieredStagingStore::new(StagingConfig::default().with_memory_threshold(16));
        let artifact = store.stage(Bytes::from_static(b"abc")).await.unwrap();

        assert_eq!(artifact.kind(), StagingKind::Memory);
        assert_eq!(artifact.len(), 3);
        assert_eq!(store.live(), 1);

        artifact.release().unwrap();
        assert_eq!(store.live(), 0);
    }

    #[tokio::test]
    async fn large_payloads_spill_and_are_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = TieredStagingStore::new(
            StagingConfig::default()
                .with_memory_threshold(4)
                .with_spill_dir(dir.path()),
        );

        let artifact = store.stage(Bytes::from_static(b"0123456789")).await.unwrap();
        assert_eq!(artifact.kind(), StagingKind::Disk);
        let path = artifact.path().unwrap().to_path_buf();
        assert!(path.exists());

        artifact.release().unwrap();
        assert!(!path.exists());
        assert_eq!(store.live(), 0);
    }

    #[tokio::test]
    async fn dropping_an_unreleased_artifact_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = TieredStagingStore::disk_only(dir.path());

        let artifact = store.stage(Bytes::from_static(b"payload")).await.unwrap();
        let path = artifact.path().unwrap().to_path_buf();
        drop(artifact);

        assert!(!path.exists());
        assert_eq!(store.live(), 0);
    }

    #[tokio::test]
    async fn ranges_read_the_same_bytes_from_either_backing() {
        let dir = tempfile::tempdir().unwrap();
        let payload = Bytes::from((0u8..=255).collect::<Vec<_>>());

        for store in [
            TieredStagingStore::memory_only(),
            TieredStagingStore::disk_only(dir.path()),
        ] {
            let artifact = store.stage(payload.clone()).await.unwrap();
            assert_eq!(artifact.read_range(10, 5).await.unwrap(), payload.slice(10..15));
            assert_eq!(artifact.read_range(250, 100).await.unwrap(), payload.slice(250..256));
            assert!(artifact.read_range(256, 10).await.unwrap().is_empty());
            assert_eq!(artifact.read_all().await.unwrap(), payload);
            artifact.release().unwrap();
        }
    }

    #[tokio::test]
    async fn empty_payload_stages() {
        let store = TieredStagingStore::memory_only();
        let artifact = store.stage(Bytes::new()).await.unwrap();
        assert!(artifact.is_empty());
        assert!(artifact.read_all().await.unwrap().is_empty());
    }
}
