//! Metrics recorded through the `metrics` facade
//!
//! No exporter is installed here; embedding applications choose their own
//! recorder.

/// Record the outcome of one legacy folder scan
pub fn record_scan(found: usize, skipped: usize, failed: usize) {
    metrics::counter!("model_manager_scan_runs_total").increment(1);
    metrics::gauge!("model_manager_scan_models_found").set(found as f64);
    metrics::counter!("model_manager_scan_dirs_skipped_total").increment(skipped as u64);
    metrics::counter!("model_manager_scan_dirs_failed_total").increment(failed as u64);
}

/// Record an import attempt against the remote registry
pub fn record_import(model_id: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("model_manager_imports_total",
        "model" => model_id.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record a metadata update pushed to the remote registry
pub fn record_update(model_id: &str) {
    metrics::counter!("model_manager_updates_total",
        "model" => model_id.to_string()
    )
    .increment(1);
}

/// Record a reconciliation pass that fell back to a stale result
pub fn record_remote_unavailable() {
    metrics::counter!("model_manager_remote_unavailable_total").increment(1);
}

/// Record a retry of a cache store operation
pub fn record_cache_retry(operation: &str) {
    metrics::counter!("model_manager_cache_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a download lifecycle transition
pub fn record_download_transition(model_id: &str, phase: &str) {
    metrics::counter!("model_manager_download_transitions_total",
        "model" => model_id.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Update the in-flight download gauge
pub fn update_active_downloads(count: usize) {
    metrics::gauge!("model_manager_active_downloads").set(count as f64);
}
