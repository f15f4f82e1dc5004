//! # Configuration Management
//!
//! Configuration for the registry engine and its server binding. The main
//! [`RegistryConfig`] struct supports JSON serialization and can be loaded
//! from a file or fall back to defaults:
//!
//! ```rust,no_run
//! # use satchel_registry::config::RegistryConfig;
//! // Load from file with fallback to defaults
//! let config = RegistryConfig::load_or_default("config.json")?;
//!
//! // Load from file (fails if the file doesn't exist)
//! let config = RegistryConfig::load("config.json")?;
//! # Ok::<(), satchel_registry::AppError>(())
//! ```
//!
//! The `artifacts_url` is the origin every stored or proxied tarball URL is
//! rewritten to; it is what lets artifacts live somewhere other than the
//! metadata.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AppResult;

/// Main configuration for the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Origin used to rewrite all tarball URLs, stored and proxied
    /// (e.g. "http://localhost:4873").
    pub artifacts_url: String,
    /// Base directory for the local filesystem storage backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Enable upstream fallback for metadata reads.
    #[serde(default)]
    pub proxy: bool,
    /// Upstream registry root for proxying.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Rewrite proxied metadata tarball URLs to the local artifacts origin.
    #[serde(default = "default_true")]
    pub proxy_cache: bool,
    /// HTTP timeout for upstream calls, in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Network settings for the server binding.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Bind address for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_proxy_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_true() -> bool {
    true
}

fn default_upstream_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 4873,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            artifacts_url: "http://localhost:4873".to_string(),
            data_dir: default_data_dir(),
            proxy: false,
            proxy_url: default_proxy_url(),
            proxy_cache: true,
            upstream_timeout_secs: default_upstream_timeout(),
            server: ServerConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_registry_contract() {
        let config = RegistryConfig::default();
        assert!(!config.proxy);
        assert!(config.proxy_cache);
        assert_eq!(config.proxy_url, "https://registry.npmjs.org");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "artifacts_url": "http://pkgs.internal", "proxy": true }"#,
        )
        .unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.artifacts_url, "http://pkgs.internal");
        assert!(config.proxy);
        assert!(config.proxy_cache);
        assert_eq!(config.server.port, 4873);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RegistryConfig::load_or_default("/does/not/exist.json").unwrap();
        assert_eq!(config.artifacts_url, "http://localhost:4873");
    }
}
