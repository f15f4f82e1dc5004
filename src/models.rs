//! # Package Metadata Model
//!
//! CouchDB-style package documents as served by the npm registry API, plus
//! the merge helpers the publish pipeline is built from.
//!
//! A [`Meta`] document is identified by its package name (`_id`/`name`) and
//! carries a revision token (`_rev`), `dist-tags`, per-version metadata and
//! optional base64 attachments. npm clients send many more fields than this
//! model names, so every struct flattens unrecognized fields into an extra
//! map and round-trips them untouched.
//!
//! Merge invariants (enforced by [`Meta::merge_dist_tags`] and
//! [`Meta::merge_versions`]): maps are upserted key-wise, never replaced
//! wholesale, so a version or tag published earlier is never silently dropped
//! by a later publish.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, AppResult};

/// A person reference as npm serializes it: either a bare string
/// (`"Jane <jane@example.com>"`) or a structured object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Human {
    Plain(String),
    Detailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

/// The `dist` block of a published version: where the tarball lives and how
/// to verify it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaDist {
    pub tarball: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Per-version metadata. Only the fields the engine touches are named; the
/// rest (dependencies, scripts, engines, ...) ride along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaVersion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub dist: MetaDist,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A base64-encoded tarball embedded in a publish payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaAttachment {
    #[serde(default)]
    pub content_type: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Creation/modification timestamps plus one entry per published version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetaTime {
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub modified: String,
    #[serde(flatten)]
    pub versions: IndexMap<String, String>,
}

/// A full package metadata document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<MetaTime>,
    #[serde(default)]
    pub versions: IndexMap<String, MetaVersion>,
    #[serde(rename = "_attachments", skip_serializing_if = "Option::is_none")]
    pub attachments: Option<IndexMap<String, MetaAttachment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(rename = "readmeFilename", skip_serializing_if = "Option::is_none")]
    pub readme_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Human>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainers: Option<Vec<Human>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Mint a fresh opaque revision token from the current time.
pub fn mint_rev() -> String {
    format!("rev-{}", Utc::now().timestamp_millis())
}

impl Meta {
    /// Synthesize a brand-new stored record from a first publish payload.
    ///
    /// Carries over identity, tags and versions from the payload; the
    /// revision and timestamps are freshly generated, and attachments are
    /// never part of the stored record.
    pub fn created_from(payload: &Meta) -> Meta {
        let now = Utc::now().to_rfc3339();
        Meta {
            id: payload.id.clone(),
            rev: Some(mint_rev()),
            name: payload.name.clone(),
            dist_tags: payload.dist_tags.clone(),
            time: Some(MetaTime {
                created: now.clone(),
                modified: now,
                versions: IndexMap::new(),
            }),
            versions: payload.versions.clone(),
            attachments: None,
            readme: None,
            readme_filename: None,
            author: None,
            maintainers: None,
            description: None,
            extra: IndexMap::new(),
        }
    }

    /// Key-wise upsert of `dist-tags`. Existing tags not named by the
    /// payload survive.
    pub fn merge_dist_tags(&mut self, tags: &IndexMap<String, String>) {
        for (tag, version) in tags {
            self.dist_tags.insert(tag.clone(), version.clone());
        }
    }

    /// Key-wise upsert of `versions`. A version published earlier is never
    /// dropped by a later publish of a different version.
    pub fn merge_versions(&mut self, versions: IndexMap<String, MetaVersion>) {
        for (version, data) in versions {
            self.versions.insert(version, data);
        }
    }

    /// Overwrite the hoisted descriptive fields from a payload wholesale.
    ///
    /// Applied only when the payload tags a `latest` version: the last full
    /// publish wins, including clearing fields the payload omits.
    pub fn hoist_descriptive_fields(&mut self, payload: &Meta) {
        self.readme = payload.readme.clone();
        self.readme_filename = payload.readme_filename.clone();
        self.author = payload.author.clone();
        self.maintainers = payload.maintainers.clone();
        self.description = payload.description.clone();
    }
}

/// Rewrite a tarball URL so its network origin becomes `artifacts_url`,
/// keeping host-relative path and query intact.
pub fn rewrite_tarball_origin(tarball: &str, artifacts_url: &str) -> AppResult<String> {
    let parsed = Url::parse(tarball)
        .map_err(|e| AppError::Validation(format!("Invalid tarball URL '{tarball}': {e}")))?;
    let origin = parsed.origin().ascii_serialization();
    Ok(parsed.as_str().replacen(&origin, artifacts_url, 1))
}

/// Rewrite every version's tarball origin in a typed metadata map.
pub fn rewrite_version_tarballs(
    versions: &mut IndexMap<String, MetaVersion>,
    artifacts_url: &str,
) -> AppResult<()> {
    for version in versions.values_mut() {
        version.dist.tarball = rewrite_tarball_origin(&version.dist.tarball, artifacts_url)?;
    }
    Ok(())
}

/// Rewrite every version's tarball origin in an untyped metadata document.
///
/// Used on proxied upstream documents, which are passed through as raw JSON
/// rather than forced into the local model. Versions without a parsable
/// tarball URL are left untouched.
pub fn rewrite_value_tarballs(metadata: &mut Value, artifacts_url: &str) {
    if let Some(versions) = metadata["versions"].as_object_mut() {
        for version_data in versions.values_mut() {
            if let Some(dist) = version_data.get_mut("dist").and_then(|d| d.as_object_mut()) {
                if let Some(tarball) = dist.get("tarball").and_then(|t| t.as_str()) {
                    if let Ok(rewritten) = rewrite_tarball_origin(tarball, artifacts_url) {
                        dist.insert("tarball".to_string(), Value::String(rewritten));
                    }
                }
            }
        }
    }
}
