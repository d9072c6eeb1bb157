//! Durable registry snapshots.
//!
//! One file per session name, `<dir>/<name>.snapshot`, holding the whole
//! registry as gzip-compressed JSON. Every save replaces the file through a
//! temp file + rename so a crash never leaves a half-written snapshot.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::domain::ChannelRegistry;
use crate::utils::fs;
use crate::{Error, Result};

const SNAPSHOT_EXTENSION: &str = "snapshot";

/// Reads and writes registry snapshots in a directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{SNAPSHOT_EXTENSION}"))
    }

    /// Overwrite the snapshot for `name` with `registry`.
    pub async fn save(&self, name: &str, registry: &ChannelRegistry) -> Result<()> {
        let path = self.path_for(name);
        let write_failed = |message: String| Error::PersistenceWriteFailed {
            path: path.clone(),
            message,
        };

        let bytes = encode(registry).map_err(|e| write_failed(e.to_string()))?;
        fs::ensure_dir_all_with_op("creating snapshot directory", &self.dir)
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        let dir = self.dir.clone();
        let target = path.clone();
        let len = bytes.len();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| write_failed(format!("writer task failed: {e}")))?
        .map_err(|e| write_failed(e.to_string()))?;

        debug!(path = %path.display(), bytes = len, "Snapshot written");
        Ok(())
    }

    /// Load the snapshot for `name`.
    ///
    /// A missing file yields [`Error::SnapshotNotFound`]; anything else that
    /// goes wrong is [`Error::PersistenceReadFailed`].
    pub async fn load(&self, name: &str) -> Result<ChannelRegistry> {
        let path = self.path_for(name);

        let bytes = fs::read_optional(&path)
            .await
            .map_err(|e| Error::PersistenceReadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?
            .ok_or_else(|| Error::SnapshotNotFound(path.clone()))?;

        let mut registry = decode(&bytes).map_err(|e| Error::PersistenceReadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let dropped = registry.drop_empty();
        if dropped > 0 {
            debug!(dropped, "Dropped channels without subscribers from snapshot");
        }

        Ok(registry)
    }
}

/// Serialize a registry into the on-disk format.
pub fn encode(registry: &ChannelRegistry) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, registry)?;
    Ok(encoder.finish()?)
}

/// Parse the on-disk format.
pub fn decode(bytes: &[u8]) -> Result<ChannelRegistry> {
    let mut json = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
