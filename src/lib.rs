//! # Satchel Registry
//!
//! A private npm-compatible package registry with a transparent upstream
//! proxy. The library splits into a transport-agnostic engine and a thin
//! HTTP binding:
//!
//! - [`router`]: ordered route table mapping paths to registry operations
//! - [`registry`]: dispatch, metadata merge and cache-aside handlers
//! - [`models`]: package metadata documents and the merge primitives
//! - [`provider`]: storage provider traits (metadata records, artifact bytes)
//! - [`local_storage`]: filesystem implementation of both provider traits
//! - [`upstream`]: proxy client for the configured upstream registry
//! - [`server`]: axum binding that feeds the engine and renders its answers
//! - [`config`]: JSON configuration with defaults
//! - [`error`]: error taxonomy and standardized HTTP error responses
//!
//! Metadata reads fall through to the upstream live; artifact reads fill
//! the local store on first fetch and are served locally afterwards.

pub mod config;
pub mod error;
pub mod local_storage;
pub mod models;
pub mod provider;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;
pub mod upstream;
pub mod validation;

// Re-export key types for convenience
pub use config::{RegistryConfig, ServerConfig};
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use local_storage::LocalStorage;
pub use models::Meta;
pub use provider::{FileProvider, MetaProvider, Storage};
pub use registry::Registry;
pub use server::run_server;
pub use types::{Body, Request, Response};
pub use upstream::{UpstreamClient, UpstreamConfig};

/// Calculate the SHA1 hash of data as a lowercase hexadecimal string.
///
/// npm carries SHA1 digests in version metadata (`dist.shasum`); this is
/// used to fill them in for published tarballs.
///
/// # Examples
///
/// ```
/// # use satchel_registry::sha1_hash;
/// let hash = sha1_hash(b"hello world");
/// assert_eq!(hash.len(), 40); // SHA1 produces 40 hex characters
/// ```
pub fn sha1_hash(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
