//! Model Manager - model registry reconciliation and download lifecycle
//!
//! Keeps a desktop client's model inventory consistent across the legacy
//! per-folder layout on disk, a local cache of downloaded models, and the
//! inference server's authoritative model registry.

pub mod config;
pub mod error;
pub mod fs;
pub mod metrics;
pub mod models;
pub mod outcome;
pub mod retry;

pub use config::ManagerConfig;
pub use error::{ModelError, ModelResult};
pub use fs::{FileSystem, LocalFileSystem};
pub use models::{
    DownloadManager, DownloadPhase, DownloadState, HttpRemoteRegistry, LegacyScanner, ModelRecord,
    Reconciler, RemoteRegistry,
};
pub use outcome::{Outcome, Settled, settle_all};
pub use retry::RetryPolicy;
