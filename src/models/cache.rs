//! Persisted cache of models known to be downloaded
//!
//! The cache is a key-value store holding one serialized list of model
//! records under [`DOWNLOADED_MODELS_KEY`]. It lets the reconciler skip the
//! legacy folder walk on every launch after the first.

use super::record::ModelRecord;
use crate::error::{ModelError, ModelResult};
use crate::retry::{RetryPolicy, retry_with_backoff};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Storage key for the downloaded model list
pub const DOWNLOADED_MODELS_KEY: &str = "downloadedModels";

// ============================================================================
// Trait Definitions
// ============================================================================

/// Persisted string key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns None if the key is absent
    async fn get(&self, key: &str) -> ModelResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> ModelResult<()>;

    async fn remove(&self, key: &str) -> ModelResult<()>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Key-value store kept as one JSON object in a file
pub struct FileKeyValueStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> ModelResult<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| ModelError::CorruptData {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn write_map(&self, map: &Map<String, Value>) -> ModelResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_file = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(map)?;

        let mut file = fs::File::create(&temp_file).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_file, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> ModelResult<Option<String>> {
        let map = self.read_map().await?;
        Ok(map.get(key).and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str) -> ModelResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> ModelResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Downloaded models cache
// ============================================================================

/// Typed access to the downloaded model list with retry on contention
pub struct DownloadedModelsCache {
    store: Arc<dyn KeyValueStore>,
    retry: RetryPolicy,
}

impl DownloadedModelsCache {
    pub fn new(store: Arc<dyn KeyValueStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Load cached records; an absent key is an empty cache
    ///
    /// An undecodable value is discarded with a warning since the list can be
    /// rebuilt from disk.
    pub async fn load(&self) -> ModelResult<Vec<ModelRecord>> {
        let raw = retry_with_backoff(&self.retry, "cache.load", || {
            self.store.get(DOWNLOADED_MODELS_KEY)
        })
        .await?;

        let Some(raw) = raw else {
            tracing::debug!("No downloaded models cached");
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<ModelRecord>>(&raw) {
            Ok(records) => {
                tracing::debug!(count = records.len(), "Loaded downloaded models from cache");
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cached model list is corrupted, ignoring it");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the cached list
    pub async fn save(&self, records: &[ModelRecord]) -> ModelResult<()> {
        let value = serde_json::to_string(records)?;
        retry_with_backoff(&self.retry, "cache.save", || {
            self.store.set(DOWNLOADED_MODELS_KEY, &value)
        })
        .await?;

        tracing::debug!(count = records.len(), "Saved downloaded models to cache");
        Ok(())
    }

    /// Remove one model from the cached list
    ///
    /// Returns whether the model was cached.
    pub async fn forget(&self, model_id: &str) -> ModelResult<bool> {
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.id != model_id);
        if records.len() == before {
            return Ok(false);
        }

        self.save(&records).await?;
        tracing::debug!(model_id = %model_id, "Dropped model from cache");
        Ok(true)
    }

    /// Drop the cached list
    pub async fn clear(&self) -> ModelResult<()> {
        retry_with_backoff(&self.retry, "cache.clear", || {
            self.store.remove(DOWNLOADED_MODELS_KEY)
        })
        .await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
