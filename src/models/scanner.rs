//! Legacy model folder discovery
//!
//! Models installed before the inference server managed its own registry
//! live in a folder per model:
//!
//! ```text
//! models/
//! ├── llama3-8b-instruct/
//! │   ├── model.json
//! │   └── llama3-8b-instruct.Q4_K_M.gguf
//! ├── tinyllama/
//! │   ├── tinyllama
//! │   └── v1.0/
//! │       └── model.json
//! └── config/
//!     └── default-model.json
//! ```
//!
//! The descriptor may sit in a nested subfolder, but binaries are only
//! looked for in the top-level model folder. A model only counts as
//! installed when its binaries are actually present there.

use super::record::{
    DESCRIPTOR_FILE_NAME, InferenceEngine, LegacyDescriptor, ModelRecord, normalize_legacy_record,
};
use crate::error::{ModelError, ModelResult};
use crate::fs::FileSystem;
use crate::metrics;
use crate::outcome::{Outcome, Settled, settle_all};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Root entries that are never model folders
const IGNORED_ENTRIES: &[&str] = &[".DS_Store", "config"];

/// Suffixes of files that count as model binaries (GGUF, TensorRT-LLM engines)
const BINARY_SUFFIXES: &[&str] = &[".gguf", ".engine"];

/// Suffix of a binary still being written by a download
pub(crate) const INCOMPLETE_SUFFIX: &str = ".download";

/// Per-directory scan results keyed by directory name
pub type ScanReport = Settled<String, ModelRecord>;

/// Scanner over the legacy `models/` layout
pub struct LegacyScanner {
    fs: Arc<dyn FileSystem>,
}

impl LegacyScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Discover all complete models under `root_dir`
    ///
    /// Never fails: missing roots yield an empty list and per-directory
    /// problems exclude only that directory.
    pub async fn scan_legacy_models(&self, root_dir: &Path) -> Vec<ModelRecord> {
        self.scan_with_report(root_dir).await.into_values()
    }

    /// Scan and keep the skipped/failed partitions for inspection
    pub async fn scan_with_report(&self, root_dir: &Path) -> ScanReport {
        self.scan(root_dir, true).await
    }

    /// Every model with a readable descriptor, installed or not
    ///
    /// Same discovery and normalization as [`scan_legacy_models`], without the
    /// binary completeness check.
    ///
    /// [`scan_legacy_models`]: Self::scan_legacy_models
    pub async fn scan_configured_models(&self, root_dir: &Path) -> Vec<ModelRecord> {
        self.scan(root_dir, false).await.into_values()
    }

    /// Whether the descriptor a record was scanned from is still on disk
    ///
    /// Records without provenance were not scanned and always count as present.
    pub async fn descriptor_present(&self, record: &ModelRecord) -> bool {
        match &record.file_path {
            Some(path) => self.fs.exists(Path::new(path)).await,
            None => true,
        }
    }

    async fn scan(&self, root_dir: &Path, require_complete: bool) -> ScanReport {
        if !self.fs.exists(root_dir).await {
            tracing::debug!(root = ?root_dir, "Model folder not found");
            return ScanReport::default();
        }

        let entries = match self.fs.list_entries(root_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(root = ?root_dir, error = %e, "Failed to list model folder");
                return ScanReport::default();
            }
        };

        let candidates = entries
            .into_iter()
            .filter(|name| !IGNORED_ENTRIES.contains(&name.as_str()))
            .map(|name| {
                let fut = self.scan_directory(root_dir, name.clone(), require_complete);
                (name, fut)
            });

        let report = settle_all(candidates).await;

        for (dir, err) in &report.failed {
            match err {
                ModelError::CorruptData { .. } => {
                    tracing::debug!(dir = %dir, error = %err, "Unable to parse model metadata");
                }
                _ => tracing::error!(dir = %dir, error = %err, "Failed to scan model folder"),
            }
        }

        tracing::info!(
            root = ?root_dir,
            require_complete,
            found = report.ok.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Legacy model scan complete"
        );
        metrics::record_scan(report.ok.len(), report.skipped.len(), report.failed.len());

        report
    }

    /// Scan one candidate folder
    async fn scan_directory(
        &self,
        root_dir: &Path,
        dir_name: String,
        require_complete: bool,
    ) -> Outcome<ModelRecord> {
        let model_dir = root_dir.join(&dir_name);

        match self.fs.is_directory(&model_dir).await {
            Ok(true) => {}
            Ok(false) => return Outcome::Skipped("not a directory".to_string()),
            Err(e) => return Outcome::Failed(e),
        }

        let descriptor_path = match self.find_descriptor(&model_dir).await {
            Ok(Some(path)) => path,
            Ok(None) => return Outcome::Skipped(format!("no {} found", DESCRIPTOR_FILE_NAME)),
            Err(e) => return Outcome::Failed(e),
        };

        let content = match self.fs.read_file(&descriptor_path).await {
            Ok(content) => content,
            Err(e) => return Outcome::Failed(e),
        };

        let descriptor = match parse_descriptor(&content, &descriptor_path) {
            Ok(descriptor) => descriptor,
            Err(e) => return Outcome::Failed(e),
        };

        let mut record = normalize_legacy_record(descriptor);
        record.file_path = Some(descriptor_path.to_string_lossy().to_string());
        record.file_name = Some(DESCRIPTOR_FILE_NAME.to_string());

        if !require_complete {
            return Outcome::Ok(record);
        }

        let files = match self.fs.list_entries(&model_dir).await {
            Ok(files) => files,
            Err(e) => return Outcome::Failed(e),
        };

        if !is_complete(&record, &dir_name, &files) {
            tracing::debug!(
                model_id = %record.id,
                dir = %dir_name,
                "Model binaries missing, treating as incomplete download"
            );
            return Outcome::Skipped(format!("model '{}' has missing binaries", record.id));
        }

        Outcome::Ok(record)
    }

    /// Depth-first search for the descriptor; the folder itself is checked first
    fn find_descriptor<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, ModelResult<Option<PathBuf>>> {
        async move {
            let entries = self.fs.list_entries(dir).await?;

            if entries.iter().any(|e| e == DESCRIPTOR_FILE_NAME) {
                let candidate = dir.join(DESCRIPTOR_FILE_NAME);
                if !self.fs.is_directory(&candidate).await? {
                    return Ok(Some(candidate));
                }
            }

            for entry in entries {
                let child = dir.join(&entry);
                if self.fs.is_directory(&child).await?
                    && let Some(found) = self.find_descriptor(&child).await?
                {
                    return Ok(Some(found));
                }
            }

            Ok(None)
        }
        .boxed()
    }

    /// Write a record's descriptor to `<models_dir>/<id>/model.json`
    pub async fn save_model(&self, models_dir: &Path, record: &ModelRecord) -> ModelResult<PathBuf> {
        let path = models_dir.join(&record.id).join(DESCRIPTOR_FILE_NAME);
        let content = serde_json::to_string_pretty(&record.without_provenance())?;
        self.fs.write_file(&path, &content).await?;

        tracing::debug!(model_id = %record.id, path = ?path, "Model descriptor saved");
        Ok(path)
    }
}

/// Decode a descriptor that is either a JSON object or a JSON string holding one
pub fn parse_descriptor(content: &str, path: &Path) -> ModelResult<LegacyDescriptor> {
    let corrupt = |reason: String| ModelError::CorruptData {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
    let value = match value {
        Value::String(inner) => {
            serde_json::from_str(&inner).map_err(|e| corrupt(e.to_string()))?
        }
        other => other,
    };

    serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
}

/// Whether a file name looks like a finished model binary
pub fn is_binary_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.ends_with(INCOMPLETE_SUFFIX) && BINARY_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Check that the binaries a record declares are present in its folder listing
///
/// Remote sources need no local file. Local sources are satisfied by a file
/// named after the model (legacy single-binary layout) or by at least as
/// many binaries as declared sources. TensorRT-LLM models pack into one
/// engine file, so a single binary is enough for them.
pub fn is_complete(record: &ModelRecord, dir_name: &str, files: &[String]) -> bool {
    if record.all_sources_remote() {
        return true;
    }

    if files.iter().any(|f| *f == record.id || f == dir_name) {
        return true;
    }

    let binaries = files.iter().filter(|f| is_binary_file(f)).count();
    let required = match record.engine {
        InferenceEngine::NitroTensorrtLlm => 1,
        _ => record.sources.len().max(1),
    };

    binaries >= required
}
