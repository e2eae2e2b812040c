//! Download lifecycle for model binaries
//!
//! Per model id the lifecycle is:
//!
//! ```text
//! NotPresent -> Downloading -> Complete
//!                          \-> Canceled -> (cleanup) -> NotPresent
//!                          \-> Failed   -> (cleanup) -> NotPresent
//! ```
//!
//! `Complete` is terminal until the model is deleted. The inference server
//! performs the actual transfer; this manager forwards requests, tracks
//! progress reported back by the server, and keeps `<models_dir>/<id>/`
//! consistent with the outcome.
//!
//! Cancellation and failure only clean up a folder the pull created, or one
//! still holding partial `.download` files. Installed models are removed by
//! `delete` alone.

use super::cache::DownloadedModelsCache;
use super::remote::{PullRequest, RemoteRegistry};
use super::scanner::INCOMPLETE_SUFFIX;
use crate::error::{ModelError, ModelResult};
use crate::fs::FileSystem;
use crate::metrics;
use crate::outcome::Outcome;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Phase of a tracked download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    Downloading,
    Complete,
    Canceled,
    Failed,
}

impl std::fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downloading => write!(f, "downloading"),
            Self::Complete => write!(f, "complete"),
            Self::Canceled => write!(f, "canceled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Transient progress of one model download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadState {
    pub model_id: String,
    pub phase: DownloadPhase,
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
    /// Bytes per second as last reported
    pub speed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The model folder did not exist when the pull started
    #[serde(skip)]
    owns_dir: bool,
}

impl DownloadState {
    fn new(model_id: String) -> Self {
        let now = Utc::now();
        Self {
            model_id,
            phase: DownloadPhase::Downloading,
            percent: 0.0,
            transferred: 0,
            total: 0,
            speed: 0,
            error: None,
            started_at: now,
            updated_at: now,
            owns_dir: false,
        }
    }

    fn apply_progress(&mut self, transferred: u64, total: u64, speed: u64) {
        self.transferred = transferred;
        self.total = total;
        self.speed = speed;
        self.percent = if total > 0 {
            (transferred as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.updated_at = Utc::now();
    }
}

/// Progress reported by the inference server for a pull
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Progress {
        model_id: String,
        transferred: u64,
        total: u64,
        speed: u64,
    },
    Finished {
        model_id: String,
    },
    Failed {
        model_id: String,
        error: String,
    },
}

/// Lifecycle notifications for subscribers (UI layer)
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started(String),
    Progress(DownloadState),
    Completed(String),
    Canceled(String),
    Failed { model_id: String, error: String },
    Deleted(String),
}

/// Tracks pulls and owns on-disk cleanup for canceled, failed and deleted models
pub struct DownloadManager {
    models_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    remote: Arc<dyn RemoteRegistry>,
    /// Pruned on delete so the model is not imported again
    cache: Option<DownloadedModelsCache>,
    states: DashMap<String, DownloadState>,
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl DownloadManager {
    pub fn new(
        models_dir: PathBuf,
        fs: Arc<dyn FileSystem>,
        remote: Arc<dyn RemoteRegistry>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            models_dir,
            fs,
            remote,
            cache: None,
            states: DashMap::new(),
            event_tx,
        }
    }

    /// Forget deleted models in the downloaded-models cache too
    pub fn with_cache(mut self, cache: DownloadedModelsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Folder holding a model's descriptor and binaries
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.models_dir.join(model_id)
    }

    pub fn state(&self, model_id: &str) -> Option<DownloadState> {
        self.states.get(model_id).map(|s| s.clone())
    }

    /// Downloads currently in flight, sorted by model id
    pub fn active_downloads(&self) -> Vec<DownloadState> {
        let mut active: Vec<_> = self
            .states
            .iter()
            .filter(|s| s.phase == DownloadPhase::Downloading)
            .map(|s| s.clone())
            .collect();
        active.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        active
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn update_gauge(&self) {
        metrics::update_active_downloads(
            self.states
                .iter()
                .filter(|s| s.phase == DownloadPhase::Downloading)
                .count(),
        );
    }

    /// Request a download of `model`, optionally registering it as `id` / `name`
    ///
    /// Returns the id the download is tracked under. Calling this while a pull
    /// for the same id is in flight forwards the request again and keeps the
    /// existing progress. A completed model is left alone until deleted.
    pub async fn pull(
        &self,
        model: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> ModelResult<String> {
        let request = PullRequest {
            model: model.to_string(),
            id: id.map(str::to_string),
            name: name.map(str::to_string),
        };
        let model_id = request.model_id().to_string();

        let phase = self.states.get(&model_id).map(|s| s.phase);
        if phase == Some(DownloadPhase::Complete) {
            tracing::info!(model_id = %model_id, "Model already downloaded, ignoring pull");
            return Ok(model_id);
        }
        let already_downloading = phase == Some(DownloadPhase::Downloading);

        if !already_downloading {
            let mut state = DownloadState::new(model_id.clone());
            state.owns_dir =
                is_safe_model_id(&model_id) && !self.fs.exists(&self.model_dir(&model_id)).await;
            self.states.insert(model_id.clone(), state);
            self.update_gauge();
        }

        tracing::info!(
            model = %model,
            model_id = %model_id,
            in_flight = already_downloading,
            "Requesting model pull"
        );

        if let Err(e) = self.remote.pull_model(&request).await {
            tracing::error!(model_id = %model_id, error = %e, "Pull request rejected");
            if !already_downloading {
                self.fail_download(&model_id, e.to_string()).await;
            }
            return Err(e);
        }

        if !already_downloading {
            metrics::record_download_transition(&model_id, "downloading");
            self.emit(LifecycleEvent::Started(model_id.clone()));
        }

        Ok(model_id)
    }

    /// Cancel a pull and remove its partial folder
    ///
    /// The folder is only touched after the server acknowledged the cancel.
    /// Canceling a completed download does nothing.
    pub async fn cancel(&self, model_id: &str) -> ModelResult<()> {
        if self.is_complete(model_id) {
            tracing::info!(model_id = %model_id, "Download already complete, nothing to cancel");
            return Ok(());
        }

        tracing::info!(model_id = %model_id, "Canceling model pull");

        self.remote.cancel_pull(model_id).await?;

        let clean_up = self.owns_partial_dir(model_id).await;
        if let Some(mut state) = self.states.get_mut(model_id) {
            state.phase = DownloadPhase::Canceled;
            state.updated_at = Utc::now();
        }
        metrics::record_download_transition(model_id, "canceled");

        let cleanup = if clean_up {
            self.remove_model_dir(model_id).await
        } else {
            tracing::info!(model_id = %model_id, "Keeping model folder, no partial download found");
            Outcome::Skipped("no partial download".to_string())
        };
        self.states.remove(model_id);
        self.update_gauge();
        self.emit(LifecycleEvent::Canceled(model_id.to_string()));

        match cleanup {
            Outcome::Failed(e) => {
                tracing::error!(model_id = %model_id, error = %e, "Failed to remove canceled download");
                Err(e)
            }
            _ => Ok(()),
        }
    }

    /// Remove a model from the server and from disk
    ///
    /// Best effort: failures are logged and reported in the outcome, never
    /// returned as errors. An already absent folder is `Skipped`.
    pub async fn delete(&self, model_id: &str) -> Outcome<()> {
        tracing::info!(model_id = %model_id, "Deleting model");

        let in_flight = self
            .states
            .get(model_id)
            .is_some_and(|s| s.phase == DownloadPhase::Downloading);
        if in_flight && let Err(e) = self.remote.cancel_pull(model_id).await {
            tracing::warn!(model_id = %model_id, error = %e, "Failed to cancel pull before delete");
        }

        if let Err(e) = self.remote.delete_model(model_id).await {
            tracing::warn!(model_id = %model_id, error = %e, "Remote registry did not delete model");
        }

        let outcome = self.remove_model_dir(model_id).await;
        if let Outcome::Failed(ref e) = outcome {
            tracing::error!(model_id = %model_id, error = %e, "Failed to remove model folder");
        }

        if let Some(cache) = &self.cache
            && let Err(e) = cache.forget(model_id).await
        {
            tracing::warn!(model_id = %model_id, error = %e, "Failed to drop model from cache");
        }

        self.states.remove(model_id);
        self.update_gauge();
        self.emit(LifecycleEvent::Deleted(model_id.to_string()));

        outcome
    }

    /// Apply a progress event reported by the server
    pub async fn handle_event(&self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress {
                model_id,
                transferred,
                total,
                speed,
            } => {
                let snapshot = {
                    let mut state = self
                        .states
                        .entry(model_id.clone())
                        .or_insert_with(|| DownloadState::new(model_id.clone()));
                    if state.phase != DownloadPhase::Downloading {
                        tracing::debug!(
                            model_id = %model_id,
                            phase = %state.phase,
                            "Ignoring progress for settled download"
                        );
                        return;
                    }
                    state.apply_progress(transferred, total, speed);
                    state.clone()
                };
                self.emit(LifecycleEvent::Progress(snapshot));
            }
            DownloadEvent::Finished { model_id } => {
                {
                    let mut state = self
                        .states
                        .entry(model_id.clone())
                        .or_insert_with(|| DownloadState::new(model_id.clone()));
                    state.phase = DownloadPhase::Complete;
                    state.percent = 100.0;
                    state.updated_at = Utc::now();
                }
                tracing::info!(model_id = %model_id, "Model download complete");
                metrics::record_download_transition(&model_id, "complete");
                self.update_gauge();
                self.emit(LifecycleEvent::Completed(model_id));
            }
            DownloadEvent::Failed { model_id, error } => {
                if self.is_complete(&model_id) {
                    tracing::debug!(model_id = %model_id, "Ignoring failure for completed download");
                    return;
                }
                tracing::error!(model_id = %model_id, error = %error, "Model download failed");
                self.fail_download(&model_id, error).await;
            }
        }
    }

    /// Mark failed, clean up the folder, forget the state
    async fn fail_download(&self, model_id: &str, error: String) {
        let clean_up = self.owns_partial_dir(model_id).await;
        if let Some(mut state) = self.states.get_mut(model_id) {
            state.phase = DownloadPhase::Failed;
            state.error = Some(error.clone());
            state.updated_at = Utc::now();
        }
        metrics::record_download_transition(model_id, "failed");

        if clean_up && let Outcome::Failed(e) = self.remove_model_dir(model_id).await {
            tracing::error!(model_id = %model_id, error = %e, "Failed to remove failed download");
        }

        self.states.remove(model_id);
        self.update_gauge();
        self.emit(LifecycleEvent::Failed {
            model_id: model_id.to_string(),
            error,
        });
    }

    fn is_complete(&self, model_id: &str) -> bool {
        self.states
            .get(model_id)
            .is_some_and(|s| s.phase == DownloadPhase::Complete)
    }

    /// Whether a canceled or failed pull may remove the model folder
    ///
    /// True when this pull created the folder, or when the folder still
    /// holds partial downloads.
    async fn owns_partial_dir(&self, model_id: &str) -> bool {
        let owned = self.states.get(model_id).is_some_and(|s| s.owns_dir);
        if owned {
            return true;
        }

        let dir = self.model_dir(model_id);
        if !is_safe_model_id(model_id) || !self.fs.exists(&dir).await {
            return false;
        }
        match self.fs.list_entries(&dir).await {
            Ok(files) => files.iter().any(|f| f.ends_with(INCOMPLETE_SUFFIX)),
            Err(e) => {
                tracing::warn!(model_id = %model_id, error = %e, "Failed to list model folder");
                false
            }
        }
    }

    /// Remove `<models_dir>/<id>/`; absent folders are skipped
    async fn remove_model_dir(&self, model_id: &str) -> Outcome<()> {
        let dir = self.model_dir(model_id);
        if !is_safe_model_id(model_id) {
            return Outcome::Failed(ModelError::Storage(format!(
                "refusing to remove {}: invalid model id",
                dir.display()
            )));
        }

        if !self.fs.exists(&dir).await {
            return Outcome::Skipped(format!("{} already absent", dir.display()));
        }

        match self.fs.remove_dir(&dir).await {
            Ok(()) => {
                tracing::debug!(model_id = %model_id, dir = ?dir, "Model folder removed");
                Outcome::Ok(())
            }
            Err(e) if e.is_not_found() => {
                Outcome::Skipped(format!("{} already absent", dir.display()))
            }
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Ids are folder names; reject anything that would escape the models folder
fn is_safe_model_id(model_id: &str) -> bool {
    let path = Path::new(model_id);
    !model_id.is_empty()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mocks::MemoryFileSystem;
    use crate::models::cache::mocks::MemoryStore;
    use crate::models::record::{InferenceEngine, ModelRecord};
    use crate::models::remote::mocks::MockRegistry;
    use crate::retry::RetryPolicy;

    async fn setup() -> (DownloadManager, Arc<MemoryFileSystem>, Arc<MockRegistry>) {
        let fs = Arc::new(MemoryFileSystem::new());
        let remote = Arc::new(MockRegistry::new());
        let manager = DownloadManager::new(PathBuf::from("/models"), fs.clone(), remote.clone());
        (manager, fs, remote)
    }

    #[tokio::test]
    async fn test_pull_sends_exact_request() {
        let (manager, _fs, remote) = setup().await;

        let id = manager
            .pull("test-model", Some("test-id"), Some("test-name"))
            .await
            .unwrap();

        assert_eq!(id, "test-id");
        let pulls = remote.pulls.read().await;
        assert_eq!(pulls.len(), 1);
        assert_eq!(
            serde_json::to_value(&pulls[0]).unwrap(),
            serde_json::json!({ "model": "test-model", "id": "test-id", "name": "test-name" })
        );
        assert_eq!(manager.state("test-id").unwrap().phase, DownloadPhase::Downloading);
    }

    #[tokio::test]
    async fn test_pull_twice_keeps_progress() {
        let (manager, _fs, remote) = setup().await;
        manager.pull("llama3", None, None).await.unwrap();
        manager
            .handle_event(DownloadEvent::Progress {
                model_id: "llama3".to_string(),
                transferred: 50,
                total: 200,
                speed: 10,
            })
            .await;

        manager.pull("llama3", None, None).await.unwrap();

        assert_eq!(remote.pulls.read().await.len(), 2);
        let state = manager.state("llama3").unwrap();
        assert_eq!(state.transferred, 50);
        assert_eq!(state.percent, 25.0);
        assert_eq!(manager.active_downloads().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_pull_cleans_up() {
        let (manager, fs, remote) = setup().await;
        fs.add_file("/models/llama3/llama3.gguf.download", "partial").await;
        remote.set_unavailable(true).await;

        assert!(manager.pull("llama3", None, None).await.is_err());
        assert!(manager.state("llama3").is_none());
        assert!(!fs.exists(Path::new("/models/llama3")).await);
    }

    async fn install(fs: &MemoryFileSystem, model_id: &str) {
        fs.add_file(format!("/models/{}/model.json", model_id), "{}").await;
        fs.add_file(format!("/models/{}/{}.gguf", model_id, model_id), "bin").await;
    }

    #[tokio::test]
    async fn test_pull_of_completed_model_keeps_it() {
        let (manager, fs, remote) = setup().await;
        install(&fs, "llama3").await;
        manager
            .handle_event(DownloadEvent::Finished {
                model_id: "llama3".to_string(),
            })
            .await;
        remote.set_unavailable(true).await;

        assert_eq!(manager.pull("llama3", None, None).await.unwrap(), "llama3");

        assert!(remote.pulls.read().await.is_empty());
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
        assert_eq!(manager.state("llama3").unwrap().phase, DownloadPhase::Complete);
    }

    #[tokio::test]
    async fn test_rejected_pull_keeps_existing_installation() {
        // Installed by an earlier process, so nothing is tracked here
        let (manager, fs, remote) = setup().await;
        install(&fs, "llama3").await;
        remote.set_unavailable(true).await;

        assert!(manager.pull("llama3", None, None).await.is_err());

        assert!(manager.state("llama3").is_none());
        assert!(fs.exists(Path::new("/models/llama3/model.json")).await);
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
    }

    #[tokio::test]
    async fn test_cancel_of_completed_download_is_a_noop() {
        let (manager, fs, remote) = setup().await;
        install(&fs, "llama3").await;
        manager
            .handle_event(DownloadEvent::Finished {
                model_id: "llama3".to_string(),
            })
            .await;

        manager.cancel("llama3").await.unwrap();

        assert!(remote.cancels.read().await.is_empty());
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
        assert_eq!(manager.state("llama3").unwrap().phase, DownloadPhase::Complete);
    }

    #[tokio::test]
    async fn test_cancel_keeps_untracked_installation() {
        let (manager, fs, remote) = setup().await;
        install(&fs, "llama3").await;

        manager.cancel("llama3").await.unwrap();

        assert_eq!(*remote.cancels.read().await, vec!["llama3".to_string()]);
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
    }

    #[tokio::test]
    async fn test_cancel_repull_keeps_installed_binaries() {
        // Folder existed before the pull and holds no partial files
        let (manager, fs, _remote) = setup().await;
        install(&fs, "llama3").await;
        manager.pull("llama3", None, None).await.unwrap();

        manager.cancel("llama3").await.unwrap();

        assert!(manager.state("llama3").is_none());
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
    }

    #[tokio::test]
    async fn test_failure_after_completion_is_ignored() {
        let (manager, fs, _remote) = setup().await;
        install(&fs, "llama3").await;
        manager
            .handle_event(DownloadEvent::Finished {
                model_id: "llama3".to_string(),
            })
            .await;
        manager
            .handle_event(DownloadEvent::Failed {
                model_id: "llama3".to_string(),
                error: "late error".to_string(),
            })
            .await;

        assert_eq!(manager.state("llama3").unwrap().phase, DownloadPhase::Complete);
        assert!(fs.exists(Path::new("/models/llama3/llama3.gguf")).await);
    }

    #[tokio::test]
    async fn test_cancel_removes_directory() {
        let (manager, fs, remote) = setup().await;
        let mut events = manager.subscribe();
        manager.pull("llama3", None, None).await.unwrap();
        fs.add_file("/models/llama3/llama3.gguf", "partial").await;

        manager.cancel("llama3").await.unwrap();

        assert_eq!(*remote.cancels.read().await, vec!["llama3".to_string()]);
        assert!(!fs.exists(Path::new("/models/llama3")).await);
        assert!(manager.state("llama3").is_none());

        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Started(id) if id == "llama3"));
        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Canceled(id) if id == "llama3"));
    }

    #[tokio::test]
    async fn test_cancel_without_ack_keeps_directory() {
        let (manager, fs, remote) = setup().await;
        manager.pull("llama3", None, None).await.unwrap();
        fs.add_file("/models/llama3/llama3.gguf", "partial").await;
        remote.set_cancel_error("no such task").await;

        assert!(manager.cancel("llama3").await.is_err());
        assert!(fs.exists(Path::new("/models/llama3")).await);
        assert_eq!(manager.state("llama3").unwrap().phase, DownloadPhase::Downloading);
    }

    #[tokio::test]
    async fn test_cancel_surfaces_cleanup_failure() {
        let (manager, fs, _remote) = setup().await;
        fs.add_file("/models/llama3/llama3.gguf.download", "partial").await;
        fs.fail_removes_of("/models/llama3").await;

        assert!(manager.cancel("llama3").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_absent_directory_is_skipped() {
        let (manager, _fs, remote) = setup().await;
        remote.set_delete_error("model not found").await;

        let outcome = manager.delete("ghost").await;
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn test_delete_removes_directory_and_remote_record() {
        let (manager, fs, remote) = setup().await;
        fs.add_file("/models/llama3/model.json", "{}").await;
        fs.add_file("/models/llama3/llama3.gguf", "bin").await;
        manager
            .handle_event(DownloadEvent::Finished {
                model_id: "llama3".to_string(),
            })
            .await;
        assert_eq!(manager.state("llama3").unwrap().phase, DownloadPhase::Complete);

        let outcome = manager.delete("llama3").await;

        assert!(outcome.is_ok());
        assert!(!fs.exists(Path::new("/models/llama3")).await);
        assert_eq!(*remote.deletes.read().await, vec!["llama3".to_string()]);
        assert!(manager.state("llama3").is_none());
    }

    #[tokio::test]
    async fn test_delete_forgets_cached_model() {
        let fs = Arc::new(MemoryFileSystem::new());
        let remote = Arc::new(MockRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        };
        let cache = DownloadedModelsCache::new(store.clone(), retry);
        cache
            .save(&[
                ModelRecord::new("llama3", InferenceEngine::LlamaCpp),
                ModelRecord::new("phi3", InferenceEngine::LlamaCpp),
            ])
            .await
            .unwrap();
        let manager = DownloadManager::new(PathBuf::from("/models"), fs.clone(), remote)
            .with_cache(DownloadedModelsCache::new(store, retry));
        install(&fs, "llama3").await;

        assert!(manager.delete("llama3").await.is_ok());

        let remaining: Vec<_> = cache.load().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec!["phi3"]);
    }

    #[tokio::test]
    async fn test_delete_reports_filesystem_failure_without_error() {
        let (manager, fs, _remote) = setup().await;
        fs.add_file("/models/llama3/llama3.gguf", "bin").await;
        fs.fail_removes_of("/models/llama3").await;

        assert!(manager.delete("llama3").await.is_failed());
    }

    #[tokio::test]
    async fn test_delete_in_flight_cancels_first() {
        let (manager, _fs, remote) = setup().await;
        manager.pull("llama3", None, None).await.unwrap();

        manager.delete("llama3").await;

        assert_eq!(*remote.cancels.read().await, vec!["llama3".to_string()]);
        assert!(manager.active_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_failed_event_cleans_up() {
        let (manager, fs, _remote) = setup().await;
        manager.pull("llama3", None, None).await.unwrap();
        fs.add_file("/models/llama3/llama3.gguf", "partial").await;

        manager
            .handle_event(DownloadEvent::Failed {
                model_id: "llama3".to_string(),
                error: "checksum mismatch".to_string(),
            })
            .await;

        assert!(manager.state("llama3").is_none());
        assert!(!fs.exists(Path::new("/models/llama3")).await);
    }

    #[tokio::test]
    async fn test_progress_after_completion_is_ignored() {
        let (manager, _fs, _remote) = setup().await;
        manager
            .handle_event(DownloadEvent::Finished {
                model_id: "llama3".to_string(),
            })
            .await;
        manager
            .handle_event(DownloadEvent::Progress {
                model_id: "llama3".to_string(),
                transferred: 1,
                total: 2,
                speed: 1,
            })
            .await;

        let state = manager.state("llama3").unwrap();
        assert_eq!(state.phase, DownloadPhase::Complete);
        assert_eq!(state.percent, 100.0);
    }

    #[tokio::test]
    async fn test_unsafe_ids_never_touch_disk() {
        let (manager, fs, _remote) = setup().await;
        fs.add_file("/etc/passwd", "root").await;

        assert!(manager.delete("../etc").await.is_failed());
        assert!(fs.exists(Path::new("/etc/passwd")).await);
    }

    #[test]
    fn test_pull_event_wire_format() {
        let event: DownloadEvent = serde_json::from_value(serde_json::json!({
            "type": "progress",
            "model_id": "llama3",
            "transferred": 10,
            "total": 100,
            "speed": 5
        }))
        .unwrap();
        assert!(matches!(event, DownloadEvent::Progress { transferred: 10, .. }));
    }

    #[test]
    fn test_download_phase_display() {
        assert_eq!(DownloadPhase::Downloading.to_string(), "downloading");
        assert_eq!(DownloadPhase::Complete.to_string(), "complete");
        assert_eq!(DownloadPhase::Canceled.to_string(), "canceled");
        assert_eq!(DownloadPhase::Failed.to_string(), "failed");
    }
}
