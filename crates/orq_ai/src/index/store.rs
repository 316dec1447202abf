use std::fs;
use std::path::PathBuf;

use orq_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::snapshot::{IndexSnapshot, IndexedDocument};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSnapshot {
    model: Option<String>,
    dims: Option<u32>,
    generation: u64,
    built_at: Option<String>,
    entries: Vec<IndexedDocument>,
}

/// On-disk copy of the last published snapshot, used to warm-start without re-embedding.
///
/// Writes go to a temp file and are renamed into place, so a reader never sees a partial file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.root.join("snapshot.json")
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to create snapshot directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }

    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let path = self.snapshot_path();
        let tmp = path.with_extension("tmp");

        let persisted = PersistedSnapshot {
            model: snapshot.model().map(str::to_string),
            dims: snapshot.dims(),
            generation: snapshot.generation(),
            built_at: snapshot.built_at().map(str::to_string),
            entries: snapshot.entries().to_vec(),
        };
        let json = serde_json::to_vec(&persisted).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to encode index snapshot")
                .with_details(e.to_string())
        })?;
        fs::write(&tmp, &json).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to write index snapshot")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to finalize index snapshot write")
                .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
        })?;
        info!(path = %path.display(), generation = snapshot.generation(), "saved index snapshot");
        Ok(())
    }

    /// Load the stored snapshot, or `None` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<IndexSnapshot>, AppError> {
        let path = self.snapshot_path();
        if !path.exists() {
            debug!(path = %path.display(), "no stored index snapshot");
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to read index snapshot")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let p: PersistedSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("AI_SNAPSHOT_STORE_FAILED", "Failed to decode index snapshot")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;

        if let Some(dims) = p.dims {
            if let Some(bad) = p.entries.iter().find(|e| e.vector.len() as u32 != dims) {
                return Err(AppError::new(
                    "AI_SNAPSHOT_STORE_FAILED",
                    "Stored snapshot has inconsistent vector dims",
                )
                .with_details(format!(
                    "record_id={}; expected={dims}; got={}",
                    bad.document.record_id,
                    bad.vector.len()
                )));
            }
        }

        Ok(Some(IndexSnapshot::from_entries(
            p.model,
            p.dims,
            p.generation,
            p.built_at,
            p.entries,
        )))
    }
}
