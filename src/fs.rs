//! Filesystem gateway used by the scanner and download manager

use crate::error::{ModelError, ModelResult};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

// ============================================================================
// Trait Definitions
// ============================================================================

/// Narrow filesystem interface consumed by the registry core
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Check whether a file or directory exists
    async fn exists(&self, path: &Path) -> bool;

    /// List entry names (not full paths) of a directory
    async fn list_entries(&self, path: &Path) -> ModelResult<Vec<String>>;

    /// Stat a path and report whether it is a directory
    async fn is_directory(&self, path: &Path) -> ModelResult<bool>;

    /// Read a file as UTF-8 text
    async fn read_file(&self, path: &Path) -> ModelResult<String>;

    /// Write a file atomically, creating parent directories
    async fn write_file(&self, path: &Path, content: &str) -> ModelResult<()>;

    /// Remove a directory and everything below it
    async fn remove_dir(&self, path: &Path) -> ModelResult<()>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Production gateway using tokio::fs
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list_entries(&self, path: &Path) -> ModelResult<Vec<String>> {
        let mut dir = fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        // read_dir order is platform dependent
        names.sort();
        Ok(names)
    }

    async fn is_directory(&self, path: &Path) -> ModelResult<bool> {
        Ok(fs::metadata(path).await?.is_dir())
    }

    async fn read_file(&self, path: &Path) -> ModelResult<String> {
        Ok(fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> ModelResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_file).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_file, path).await?;

        Ok(())
    }

    async fn remove_dir(&self, path: &Path) -> ModelResult<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ModelError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
