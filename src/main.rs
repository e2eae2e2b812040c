//! Model Manager - maintenance CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use model_manager::models::{DownloadedModelsCache, FileKeyValueStore};
use model_manager::{
    DownloadManager, HttpRemoteRegistry, LegacyScanner, LocalFileSystem, ManagerConfig, Outcome,
    Reconciler, RemoteRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "model-manager")]
#[command(about = "Model registry reconciliation and download maintenance", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the models folder
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Override the inference server URL
    #[arg(long)]
    registry_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the legacy models folder without contacting the server
    Scan {
        /// Also list models whose binaries are missing
        #[arg(long)]
        all: bool,
    },
    /// Reconcile local models with the server and print the result
    List {
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the server to download a model
    Pull {
        /// Model reference (repo, url or catalog id)
        model: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Cancel an in-flight download and remove its partial files
    Cancel { model_id: String },
    /// Delete a model from the server and from disk
    Delete { model_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for command output
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    // Load configuration
    let mut config = ManagerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(models_dir) = cli.models_dir {
        config.models_dir = models_dir;
    }
    if let Some(url) = cli.registry_url {
        config.registry_url = url;
    }

    config.validate()?;

    tracing::debug!(
        models_dir = ?config.models_dir,
        cache_file = ?config.cache_file,
        registry_url = %config.registry_url,
        "Configuration loaded"
    );

    match cli.command {
        Command::Scan { all } => scan(&config, all).await,
        Command::List { json } => list(&config, json).await,
        Command::Pull { model, id, name } => {
            let downloads = download_manager(&config)?;
            let model_id = downloads
                .pull(&model, id.as_deref(), name.as_deref())
                .await
                .with_context(|| format!("Failed to pull {}", model))?;
            println!("pulling {}", model_id);
            Ok(())
        }
        Command::Cancel { model_id } => {
            let downloads = download_manager(&config)?;
            downloads
                .cancel(&model_id)
                .await
                .with_context(|| format!("Failed to cancel {}", model_id))?;
            println!("canceled {}", model_id);
            Ok(())
        }
        Command::Delete { model_id } => {
            let downloads = download_manager(&config)?;
            match downloads.delete(&model_id).await {
                Outcome::Ok(()) => println!("deleted {}", model_id),
                Outcome::Skipped(reason) => println!("skipped {}: {}", model_id, reason),
                Outcome::Failed(e) => {
                    anyhow::bail!("Failed to delete {}: {}", model_id, e);
                }
            }
            Ok(())
        }
    }
}

fn remote_registry(config: &ManagerConfig) -> Result<Arc<dyn RemoteRegistry>> {
    let remote = HttpRemoteRegistry::new(
        &config.registry_url,
        Duration::from_secs(config.remote_timeout_secs),
    )
    .context("Failed to create registry client")?;
    Ok(Arc::new(remote))
}

fn downloaded_models_cache(config: &ManagerConfig) -> DownloadedModelsCache {
    DownloadedModelsCache::new(
        Arc::new(FileKeyValueStore::new(config.cache_file.clone())),
        config.retry,
    )
}

fn download_manager(config: &ManagerConfig) -> Result<DownloadManager> {
    Ok(DownloadManager::new(
        config.models_dir.clone(),
        Arc::new(LocalFileSystem::new()),
        remote_registry(config)?,
    )
    .with_cache(downloaded_models_cache(config)))
}

async fn scan(config: &ManagerConfig, all: bool) -> Result<()> {
    let scanner = LegacyScanner::new(Arc::new(LocalFileSystem::new()));

    if all {
        for record in scanner.scan_configured_models(&config.models_dir).await {
            println!("configured {:<40} {}", record.id, record.engine);
        }
        return Ok(());
    }

    let report = scanner.scan_with_report(&config.models_dir).await;

    for (dir, record) in &report.ok {
        println!("ok       {:<32} {} ({})", dir, record.id, record.engine);
    }
    for (dir, reason) in &report.skipped {
        println!("skipped  {:<32} {}", dir, reason);
    }
    for (dir, err) in &report.failed {
        println!("failed   {:<32} {}", dir, err);
    }
    Ok(())
}

async fn list(config: &ManagerConfig, json: bool) -> Result<()> {
    let fs = Arc::new(LocalFileSystem::new());
    let reconciler = Reconciler::new(
        remote_registry(config)?,
        downloaded_models_cache(config),
        LegacyScanner::new(fs),
        config.models_dir.clone(),
    );

    let report = reconciler
        .reconcile()
        .await
        .context("Failed to reconcile models")?;

    if report.stale {
        tracing::warn!("Inference server unreachable, nothing imported");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report.models)?);
    } else {
        for model in &report.models {
            println!("{:<40} {:<20} {}", model.id, model.engine, model.display_name());
        }
        tracing::info!(
            imported = report.imported.len(),
            updated = report.updated.len(),
            failed = report.failed.len(),
            "Reconciliation finished"
        );
    }
    Ok(())
}
