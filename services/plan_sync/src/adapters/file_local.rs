//! services/plan_sync/src/adapters/file_local.rs
//!
//! The on-device cache: one JSON file per collection. It implements the
//! `LocalStore` port from the `core` crate.

use async_trait::async_trait;
use plan_sync_core::ports::{LocalStore, PortError, PortResult};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A `LocalStore` that keeps each collection in `<dir>/<key>.json`.
#[derive(Clone, Debug)]
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    /// Creates a new `FileLocalStore`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PortError::Unexpected(format!(
                "invalid local collection key '{}'",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

//=========================================================================================
// `LocalStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn read_list(&self, key: &str) -> PortResult<Vec<Value>> {
        let path = self.file_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| PortError::Unexpected(format!("corrupt collection '{}': {}", key, e)))
    }

    async fn write_list(&self, key: &str, items: Vec<Value>) -> PortResult<()> {
        let path = self.file_for(key)?;
        let bytes = serde_json::to_vec(&items).map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Write next to the target and rename so readers never see a torn file.
        // Each write gets its own temp name so concurrent writers never share one.
        let tmp = self
            .dir
            .join(format!(".{}.{}.json.tmp", key, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PortError::Unexpected(e.to_string()));
        }

        debug!("Wrote {} items to local collection '{}'", items.len(), key);
        Ok(())
    }
}
