//! # Local Filesystem Storage
//!
//! A storage backend keeping everything under one base directory:
//!
//! - artifacts live verbatim under their registry path
//!   (`{base}/{pkg}/-/{file}.tgz`)
//! - package metadata lives at `{base}/{pkg}/manifest.json`
//! - revision snapshots live at `{base}/{pkg}/rev/{rev}.json`
//!
//! Missing files read as `None`; every other I/O failure surfaces as a
//! storage error. Parent directories are created on write.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::Meta;
use crate::provider::{FileProvider, MetaProvider};
use crate::validation::validate_artifact_path;

/// Filesystem-backed implementation of both provider capabilities.
pub struct LocalStorage {
    base: PathBuf,
}

impl LocalStorage {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        LocalStorage { base: base.into() }
    }

    /// Resolve a registry path (leading slash optional) against the base
    /// directory, after screening it for traversal.
    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        validate_artifact_path(path)?;
        Ok(self.base.join(path.trim_start_matches('/')))
    }

    fn manifest_path(&self, package: &str) -> AppResult<PathBuf> {
        self.resolve(&format!("{package}/manifest.json"))
    }

    fn snapshot_path(&self, package: &str, rev: &str) -> AppResult<PathBuf> {
        self.resolve(&format!("{package}/rev/{rev}.json"))
    }

    async fn write_bytes(path: &Path, content: &[u8]) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Ensured parent directory");
        }
        fs::write(path, content).await?;
        info!(path = %path.display(), size = content.len(), "File saved");
        Ok(())
    }

    async fn read_bytes(path: &Path) -> AppResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl MetaProvider for LocalStorage {
    async fn get_meta(&self, package: &str) -> AppResult<Option<Meta>> {
        let path = self.manifest_path(package)?;
        match Self::read_bytes(&path).await? {
            Some(raw) => {
                let meta = serde_json::from_slice(&raw).map_err(|e| {
                    AppError::Storage(format!("Corrupt manifest for {package}: {e}"))
                })?;
                Ok(Some(meta))
            }
            None => {
                debug!(package = %package, "No manifest on disk");
                Ok(None)
            }
        }
    }

    async fn write_meta(&self, package: &str, meta: &Meta, rev: Option<&str>) -> AppResult<()> {
        let path = match rev {
            Some(rev) => self.snapshot_path(package, rev)?,
            None => self.manifest_path(package)?,
        };
        let raw = serde_json::to_vec_pretty(meta)?;
        Self::write_bytes(&path, &raw).await?;
        info!(package = %package, snapshot = rev.is_some(), "Wrote package metadata");
        Ok(())
    }

    async fn delete_meta(&self, package: &str) -> AppResult<bool> {
        let path = self.manifest_path(package)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(package = %package, "Deleted package manifest");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete manifest for {package}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl FileProvider for LocalStorage {
    async fn get_file(&self, path: &str) -> AppResult<Option<Bytes>> {
        let resolved = self.resolve(path)?;
        Ok(Self::read_bytes(&resolved).await?.map(Bytes::from))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> AppResult<()> {
        let resolved = self.resolve(path)?;
        Self::write_bytes(&resolved, content).await
    }

    async fn delete_file(&self, path: &str) -> AppResult<bool> {
        let resolved = self.resolve(path)?;
        match fs::remove_file(&resolved).await {
            Ok(()) => {
                info!(path = %path, "Deleted artifact");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete artifact {path}: {e}"
            ))),
        }
    }

    async fn delete_dir(&self, prefix: &str) -> AppResult<bool> {
        let resolved = self.resolve(prefix)?;
        match fs::remove_dir_all(&resolved).await {
            Ok(()) => {
                info!(prefix = %prefix, "Deleted artifact subtree");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete subtree {prefix}: {e}"
            ))),
        }
    }
}
