//! Model inventory management
//!
//! Provides functionality for:
//! - Discovering models installed in the legacy per-folder layout
//! - Caching the downloaded model list between launches
//! - Reconciling local models with the inference server's registry
//! - Tracking pull/cancel/delete of model binaries

pub mod cache;
pub mod download;
pub mod reconciler;
pub mod record;
pub mod remote;
pub mod scanner;

pub use cache::{DOWNLOADED_MODELS_KEY, DownloadedModelsCache, FileKeyValueStore, KeyValueStore};
pub use download::{DownloadEvent, DownloadManager, DownloadPhase, DownloadState, LifecycleEvent};
pub use reconciler::{ReconcileReport, Reconciler};
pub use record::{
    DESCRIPTOR_FILE_NAME, InferenceEngine, LegacyDescriptor, ModelRecord, ModelSource,
    normalize_legacy_record,
};
pub use remote::{HttpRemoteRegistry, ImportRequest, ModelUpdate, PullRequest, RemoteRegistry};
pub use scanner::{LegacyScanner, ScanReport, is_complete};
