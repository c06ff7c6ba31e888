//! File-backed single-slot store.
//!
//! One JSON file holds the slot. Writes go to a sibling temp file first
//! and are renamed into place, so a crash mid-write leaves either the
//! old record or the new one, never a torn file.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::record::PersistedJob;
use crate::{JobStore, StoreError};

/// Single-slot store backed by one JSON file.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        tmp.set_extension("json.tmp");
        tmp
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, record: &PersistedJob) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), status = ?record.status, "Job persisted");
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedJob>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
