//! # Storage Provider Contracts
//!
//! The engine persists nothing itself; it consumes two independent
//! capability traits. A backend may implement both ([`Storage::combined`])
//! or the two halves can come from different backends
//! ([`Storage::split`]) — the choice is made once at construction, never
//! per call.
//!
//! Delete operations report soft failure as `Ok(false)` (nothing to delete,
//! backend refused) and reserve `Err` for hard backend errors; the engine
//! maps soft failure to a 500 response per the registry API contract.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::Meta;

/// Metadata persistence: package documents addressed by package name.
#[async_trait]
pub trait MetaProvider: Send + Sync {
    /// Fetch the primary metadata record, or `None` if the package is
    /// unknown to this backend.
    async fn get_meta(&self, package: &str) -> AppResult<Option<Meta>>;

    /// Persist a metadata record. With `rev` present this is a snapshot
    /// write under a revision-qualified key and must not overwrite the
    /// primary record.
    async fn write_meta(&self, package: &str, meta: &Meta, rev: Option<&str>) -> AppResult<()>;

    /// Remove the primary metadata record. `Ok(false)` when there was
    /// nothing to remove.
    async fn delete_meta(&self, package: &str) -> AppResult<bool>;
}

/// Artifact persistence: opaque byte blobs addressed by registry path.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Fetch an artifact, or `None` if the path is unknown.
    async fn get_file(&self, path: &str) -> AppResult<Option<Bytes>>;

    /// Persist an artifact under the given path, creating intermediate
    /// structure as needed.
    async fn write_file(&self, path: &str, content: &[u8]) -> AppResult<()>;

    /// Remove a single artifact. `Ok(false)` when there was nothing to
    /// remove.
    async fn delete_file(&self, path: &str) -> AppResult<bool>;

    /// Remove every artifact under a path prefix. `Ok(false)` when the
    /// subtree did not exist.
    async fn delete_dir(&self, prefix: &str) -> AppResult<bool>;
}

/// The pair of capabilities the engine dispatches against.
#[derive(Clone)]
pub struct Storage {
    pub meta: Arc<dyn MetaProvider>,
    pub files: Arc<dyn FileProvider>,
}

impl Storage {
    /// One backend serving both capability sets.
    pub fn combined<P>(provider: P) -> Self
    where
        P: MetaProvider + FileProvider + 'static,
    {
        let provider = Arc::new(provider);
        Storage {
            meta: provider.clone(),
            files: provider,
        }
    }

    /// Independent metadata and artifact backends.
    pub fn split(meta: Arc<dyn MetaProvider>, files: Arc<dyn FileProvider>) -> Self {
        Storage { meta, files }
    }
}
