//! Durable storage for captured payloads.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A payload written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    /// Serialized document as written
    pub content: String,
    pub created_at: DateTime<FixedOffset>,
}

impl StoredArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Writes payloads as indented JSON named `<prefix>_<YYYYMMDD_HHMMSS>.json`
///
/// Two saves within the same IST second map to the same name; the later one
/// overwrites the earlier.
pub struct PayloadStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
    latest: Mutex<Option<StoredArtifact>>,
}

impl PayloadStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: "json".to_string(),
            latest: Mutex::new(None),
        }
    }

    pub fn file_name_for(&self, at: &DateTime<FixedOffset>) -> String {
        format!(
            "{}_{}.{}",
            self.prefix,
            clock::file_stamp(at),
            self.extension
        )
    }

    pub async fn save(&self, payload: &Value) -> Result<StoredArtifact, StoreError> {
        self.save_at(payload, clock::ist_now()).await
    }

    pub async fn save_at(
        &self,
        payload: &Value,
        at: DateTime<FixedOffset>,
    ) -> Result<StoredArtifact, StoreError> {
        let content = serde_json::to_string_pretty(payload)?;
        let path = self.dir.join(self.file_name_for(&at));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        let artifact = StoredArtifact {
            path,
            content,
            created_at: at,
        };
        info!(
            artifact = %artifact.path.display(),
            bytes = artifact.size(),
            "Payload saved"
        );
        *self.latest.lock() = Some(artifact.clone());
        Ok(artifact)
    }

    /// Most recent successful save, if any
    pub fn latest(&self) -> Option<StoredArtifact> {
        self.latest.lock().clone()
    }

    /// Remove a stored artifact; never fails
    pub async fn cleanup(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(artifact = %path.display(), "Artifact removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(artifact = %path.display(), "Artifact already gone");
            }
            Err(err) => warn!(artifact = %path.display(), "Could not remove artifact: {err}"),
        }
        let mut latest = self.latest.lock();
        if latest.as_ref().is_some_and(|a| a.path == path) {
            *latest = None;
        }
    }

    /// Remove the most recent artifact, if one exists
    pub async fn cleanup_latest(&self) {
        let latest = self.latest();
        if let Some(artifact) = latest {
            self.cleanup(&artifact.path).await;
        }
    }
}
