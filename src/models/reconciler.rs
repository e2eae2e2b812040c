//! Reconciliation between locally known models and the inference server
//!
//! Locally known models come from the downloaded-models cache or, on first
//! launch, from a legacy folder scan. Any of them the server does not know
//! yet are imported exactly once per process; the server's list is then the
//! answer.

use super::cache::DownloadedModelsCache;
use super::record::ModelRecord;
use super::remote::{ModelUpdate, RemoteRegistry};
use super::scanner::LegacyScanner;
use crate::error::{ModelError, ModelResult};
use crate::metrics;
use crate::outcome::{Outcome, settle_all};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Detailed result of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Final model list, deduplicated by id
    pub models: Vec<ModelRecord>,
    pub imported: Vec<String>,
    pub updated: Vec<String>,
    /// Candidates left alone, with the reason
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, ModelError)>,
    /// True when the server was unreachable and `models` is the last known list
    pub stale: bool,
}

/// Merges the local model inventory into the server's registry
pub struct Reconciler {
    remote: Arc<dyn RemoteRegistry>,
    cache: DownloadedModelsCache,
    scanner: LegacyScanner,
    models_dir: PathBuf,
    /// Ids imported or being imported by this process
    claimed: Mutex<HashSet<String>>,
    last_known: RwLock<Vec<ModelRecord>>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteRegistry>,
        cache: DownloadedModelsCache,
        scanner: LegacyScanner,
        models_dir: PathBuf,
    ) -> Self {
        Self {
            remote,
            cache,
            scanner,
            models_dir,
            claimed: Mutex::new(HashSet::new()),
            last_known: RwLock::new(Vec::new()),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Reconcile and return the merged model list
    pub async fn get_models(&self) -> ModelResult<Vec<ModelRecord>> {
        Ok(self.reconcile().await?.models)
    }

    /// Run one reconciliation pass
    ///
    /// Only a cache store failure is returned as an error. An unreachable
    /// server yields the last successful list marked `stale`.
    pub async fn reconcile(&self) -> ModelResult<ReconcileReport> {
        let candidates = dedupe_by_id(self.local_candidates().await?);

        let remote_models = match self.remote.list_models().await {
            Ok(models) => models,
            Err(e) => {
                let models = self.last_known.read().await.clone();
                tracing::warn!(
                    error = %e,
                    cached = models.len(),
                    "Model registry unreachable, returning last known models"
                );
                metrics::record_remote_unavailable();
                return Ok(ReconcileReport {
                    models,
                    stale: true,
                    ..Default::default()
                });
            }
        };

        let mut report = ReconcileReport::default();
        let remote_by_id: HashMap<&str, &ModelRecord> =
            remote_models.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut to_import = Vec::new();
        let mut to_update = Vec::new();
        {
            let mut claimed = self.claimed.lock().await;
            for candidate in &candidates {
                match remote_by_id.get(candidate.id.as_str()) {
                    Some(remote) if remote.display_differs(candidate) => {
                        to_update.push(ModelUpdate::from(candidate));
                    }
                    Some(_) => {}
                    None => {
                        if claimed.insert(candidate.id.clone()) {
                            to_import.push(candidate);
                        } else {
                            report
                                .skipped
                                .push((candidate.id.clone(), "import already claimed".to_string()));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            candidates = candidates.len(),
            remote = remote_models.len(),
            imports = to_import.len(),
            updates = to_update.len(),
            "Reconciling models"
        );

        let imports = settle_all(to_import.iter().map(|record| {
            let remote = self.remote.clone();
            let fut = async move { Outcome::from(remote.import_model(record).await) };
            (record.id.clone(), fut)
        }))
        .await;

        let mut imported_records = Vec::new();
        for (id, ()) in imports.ok {
            tracing::info!(model_id = %id, "Imported model into registry");
            metrics::record_import(&id, true);
            if let Some(record) = to_import.iter().find(|r| r.id == id) {
                imported_records.push(record.without_provenance());
            }
            report.imported.push(id);
        }
        if !imports.failed.is_empty() {
            let mut claimed = self.claimed.lock().await;
            for (id, e) in imports.failed {
                tracing::error!(model_id = %id, error = %e, "Failed to import model");
                metrics::record_import(&id, false);
                // A later pass may retry
                claimed.remove(&id);
                report.failed.push((id, e));
            }
        }

        let updates = settle_all(to_update.iter().map(|update| {
            let remote = self.remote.clone();
            let fut = async move { Outcome::from(remote.update_model(update).await) };
            (update.id.clone(), fut)
        }))
        .await;

        for (id, ()) in updates.ok {
            tracing::debug!(model_id = %id, "Updated model metadata");
            metrics::record_update(&id);
            report.updated.push(id);
        }
        for (id, e) in updates.failed {
            tracing::warn!(model_id = %id, error = %e, "Failed to update model metadata");
            report.failed.push((id, e));
        }

        let refreshed = match self.remote.list_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, "Registry re-fetch failed, merging locally");
                remote_models.into_iter().chain(imported_records).collect()
            }
        };

        report.models = merge_provenance(refreshed, &candidates);
        *self.last_known.write().await = report.models.clone();

        tracing::info!(
            models = report.models.len(),
            imported = report.imported.len(),
            updated = report.updated.len(),
            failed = report.failed.len(),
            "Model reconciliation complete"
        );

        Ok(report)
    }

    /// Cached models, else a legacy scan persisted into the cache
    ///
    /// Cached models whose descriptor was removed from disk are dropped from
    /// the cache instead of being imported again.
    async fn local_candidates(&self) -> ModelResult<Vec<ModelRecord>> {
        let cached = self.cache.load().await?;
        if !cached.is_empty() {
            let mut present = Vec::with_capacity(cached.len());
            for record in &cached {
                if self.scanner.descriptor_present(record).await {
                    present.push(record.clone());
                } else {
                    tracing::info!(model_id = %record.id, "Model folder removed, dropping from cache");
                }
            }
            if present.len() != cached.len() {
                self.cache.save(&present).await?;
            }
            return Ok(present);
        }

        let scanned = self.scanner.scan_legacy_models(&self.models_dir).await;
        if !scanned.is_empty() {
            self.cache.save(&scanned).await?;
        }
        Ok(scanned)
    }
}

/// Keep the first record per id
fn dedupe_by_id(records: Vec<ModelRecord>) -> Vec<ModelRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

/// Server fields win; provenance is copied from local candidates where missing
fn merge_provenance(models: Vec<ModelRecord>, candidates: &[ModelRecord]) -> Vec<ModelRecord> {
    let local: HashMap<&str, &ModelRecord> =
        candidates.iter().map(|c| (c.id.as_str(), c)).collect();

    dedupe_by_id(models)
        .into_iter()
        .map(|mut model| {
            if let Some(candidate) = local.get(model.id.as_str()) {
                model.adopt_provenance(candidate);
            }
            model
        })
        .collect()
}
