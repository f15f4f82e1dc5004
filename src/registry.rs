//! # Registry Engine
//!
//! Request dispatch, metadata merge and the cache-aside protocol. This is
//! the heart of the server: the HTTP binding hands every request to
//! [`Registry::handle`], which walks the route table and runs the matched
//! operation against the storage provider and, on miss, the upstream proxy
//! client.
//!
//! Caching is asymmetric by design: metadata reads are proxied live (the
//! upstream answer is rewritten but never persisted), while artifact reads
//! fill the local store on first fetch and bypass the upstream afterwards.
//!
//! The publish read-modify-write sequence is not atomic across concurrent
//! publishes of the same package; the revision snapshot taken before each
//! merge is the recovery point.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::{debug, info, warn};

use axum::http::StatusCode;

use crate::config::RegistryConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    mint_rev, rewrite_value_tarballs, rewrite_version_tarballs, Meta,
};
use crate::provider::Storage;
use crate::router::{self, Op};
use crate::sha1_hash;
use crate::types::{Body, Request, Response};
use crate::upstream::{UpstreamClient, UpstreamConfig};
use crate::validation::{validate_artifact_path, validate_attachment_name, validate_package_name};

/// The dispatch + merge + cache-aside engine.
pub struct Registry {
    config: RegistryConfig,
    storage: Storage,
    upstream: UpstreamClient,
}

impl Registry {
    /// Build a registry over the given storage, with an upstream client
    /// derived from the configuration.
    pub fn new(config: RegistryConfig, storage: Storage) -> AppResult<Self> {
        let upstream = UpstreamClient::new(UpstreamConfig {
            url: config.proxy_url.clone(),
            timeout: std::time::Duration::from_secs(config.upstream_timeout_secs),
            enabled: true,
        })?;
        Ok(Registry {
            config,
            storage,
            upstream,
        })
    }

    /// Build a registry with an explicitly constructed upstream client.
    pub fn with_upstream(config: RegistryConfig, storage: Storage, upstream: UpstreamClient) -> Self {
        Registry {
            config,
            storage,
            upstream,
        }
    }

    /// Dispatch a request through the route table. Fails with a
    /// route-not-found error when the table is exhausted.
    pub async fn handle(&self, request: Request) -> AppResult<Response> {
        let matched = router::dispatch(&request.method, &request.path).ok_or_else(|| {
            AppError::RouteNotFound {
                method: request.method.to_string(),
                path: request.path.clone(),
            }
        })?;
        debug!(op = ?matched.op, method = %request.method, path = %request.path, "Dispatching request");

        match matched.op {
            Op::GetPackage => {
                self.get_package(&request, &capture(&matched.pkg, "pkg")?).await
            }
            Op::PutPackage => {
                self.put_package(&request, &capture(&matched.pkg, "pkg")?).await
            }
            Op::PutRevision => {
                self.put_revision(
                    &request,
                    &capture(&matched.pkg, "pkg")?,
                    &capture(&matched.rev, "rev")?,
                )
                .await
            }
            Op::DeletePackage => self.delete_package(&capture(&matched.pkg, "pkg")?).await,
            Op::GetDistTags => {
                self.get_dist_tags(&request, &capture(&matched.pkg, "pkg")?).await
            }
            Op::PutDistTag => {
                self.put_dist_tag(&request, &capture(&matched.pkg, "pkg")?, matched.tag.as_deref())
                    .await
            }
            Op::Audit => self.audit(&request).await,
            Op::Ping => Ok(Response::ok()),
            Op::Login | Op::UserPassthrough => self.passthrough(&request).await,
            Op::GetArtifact => self.get_artifact(&request).await,
            Op::DeleteArtifact => {
                self.delete_artifact(&capture(&matched.path, "path")?).await
            }
        }
    }

    /// Shared metadata lookup: local record first, then (when enabled) the
    /// upstream. Returns the status to relay and the document, `None` when
    /// neither side has one.
    async fn lookup_package(
        &self,
        request: &Request,
        pkg: &str,
    ) -> AppResult<(StatusCode, Option<Value>)> {
        if let Some(meta) = self.storage.meta.get_meta(pkg).await? {
            debug!(package = %pkg, "Serving metadata from local storage");
            return Ok((StatusCode::OK, Some(serde_json::to_value(meta)?)));
        }

        if !self.config.proxy {
            return Ok((StatusCode::OK, None));
        }

        debug!(package = %pkg, "No local metadata, consulting upstream");
        let proxied = self.upstream.proxy(request).await?;
        if proxied.body.is_empty() {
            return Ok((proxied.status, None));
        }

        let mut doc: Value = serde_json::from_slice(&proxied.body).map_err(|e| {
            warn!(package = %pkg, error = %e, "Unparsable upstream metadata");
            AppError::Upstream(format!("Unparsable upstream metadata for {pkg}: {e}"))
        })?;

        if proxied.status.as_u16() < 400 && self.config.proxy_cache {
            // Point clients at our artifact origin so tarball downloads
            // flow through the cache-aside path below
            rewrite_value_tarballs(&mut doc, &self.config.artifacts_url);
        }
        Ok((proxied.status, Some(doc)))
    }

    /// `GET /{pkg}` — serve metadata, local record first. Proxied answers
    /// are relayed live and never written back to storage.
    async fn get_package(&self, request: &Request, pkg: &str) -> AppResult<Response> {
        validate_package_name(pkg)?;
        info!(package = %pkg, "Fetching package metadata");
        match self.lookup_package(request, pkg).await? {
            (status, Some(doc)) => Ok(Response::json(status, doc)),
            (_, None) => Err(AppError::NotFound(format!("Package not found: {pkg}"))),
        }
    }

    /// `PUT /{pkg}` — the publish merge pipeline (order matters):
    ///
    /// 1. kick off the read of the existing record
    /// 2. write attachments, one at a time, in payload order
    /// 3. snapshot the stored state under its current revision, then mint
    ///    a new revision for the working copy
    /// 4. upsert `dist-tags`
    /// 5. rewrite payload tarball origins to the artifacts origin
    /// 6. upsert `versions`
    /// 7. on a `latest` tag, hoist the descriptive fields wholesale
    /// 8. persist the working copy as the primary record
    async fn put_package(&self, request: &Request, pkg: &str) -> AppResult<Response> {
        validate_package_name(pkg)?;
        let payload = request
            .body
            .as_json()
            .ok_or_else(|| AppError::Validation("Publish payload must be a JSON document".into()))?
            .clone();
        let mut payload: Meta = serde_json::from_value(payload)?;

        // Reject before any side effect
        if pkg != payload.name {
            warn!(url_name = %pkg, body_name = %payload.name, "Publish name mismatch");
            return Err(AppError::Validation(format!(
                "Package names from URL ({pkg}) and body.name ({}) do not match",
                payload.name
            )));
        }

        info!(package = %pkg, versions = payload.versions.len(), "Publishing package");

        let attachments = payload.attachments.take();
        let name = payload.name.clone();

        let read_existing = self.storage.meta.get_meta(&name);
        let write_attachments = async {
            let mut digests: Vec<(String, String)> = Vec::new();
            if let Some(attachments) = &attachments {
                for (filename, attachment) in attachments {
                    validate_attachment_name(filename)?;
                    let data = general_purpose::STANDARD.decode(&attachment.data)?;
                    let shasum = sha1_hash(&data);
                    self.storage
                        .files
                        .write_file(&format!("/{name}/-/{filename}"), &data)
                        .await?;
                    debug!(package = %name, filename = %filename, size = data.len(), shasum = %shasum, "Stored publish attachment");
                    digests.push((filename.clone(), shasum));
                }
            }
            Ok::<_, AppError>(digests)
        };
        let (existing, digests) = tokio::try_join!(read_existing, write_attachments)?;

        // Fill in integrity hashes the client left out
        for version in payload.versions.values_mut() {
            if version.dist.shasum.is_none() {
                if let Some((_, shasum)) = digests
                    .iter()
                    .find(|(filename, _)| version.dist.tarball.ends_with(filename.as_str()))
                {
                    version.dist.shasum = Some(shasum.clone());
                }
            }
        }

        let mut current = match existing {
            None => Meta::created_from(&payload),
            Some(mut stored) => {
                match stored.rev.clone() {
                    Some(rev) => {
                        self.storage.meta.write_meta(&name, &stored, Some(&rev)).await?;
                    }
                    None => {
                        warn!(package = %name, "Stored record carries no revision, skipping snapshot")
                    }
                }
                stored.rev = Some(mint_rev());
                stored
            }
        };

        current.merge_dist_tags(&payload.dist_tags);
        rewrite_version_tarballs(&mut payload.versions, &self.config.artifacts_url)?;
        current.merge_versions(payload.versions.clone());
        if payload.dist_tags.contains_key("latest") {
            current.hoist_descriptive_fields(&payload);
        }
        current.attachments = None;

        self.storage.meta.write_meta(&name, &current, None).await?;
        info!(package = %name, rev = ?current.rev, "Package published");
        Ok(Response::ok())
    }

    /// `GET /-/package/{pkg}/dist-tags` — project the `dist-tags` field,
    /// empty mapping when the package body is absent.
    async fn get_dist_tags(&self, request: &Request, pkg: &str) -> AppResult<Response> {
        validate_package_name(pkg)?;
        let (status, doc) = self.lookup_package(request, pkg).await?;
        let tags = doc
            .map(|d| d["dist-tags"].clone())
            .filter(|t| !t.is_null())
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(Response::json(status, tags))
    }

    /// `PUT /-/package/{pkg}/dist-tags[/{tag}]` — upsert one tag (string
    /// version body) or, on the tagless route, a whole tag map.
    async fn put_dist_tag(
        &self,
        request: &Request,
        pkg: &str,
        tag: Option<&str>,
    ) -> AppResult<Response> {
        validate_package_name(pkg)?;
        let (_, doc) = self.lookup_package(request, pkg).await?;
        let doc = doc.ok_or_else(|| AppError::NotFound(format!("Package not found: {pkg}")))?;
        let mut meta: Meta = serde_json::from_value(doc)?;

        match tag {
            Some(tag) => {
                let version = match &request.body {
                    Body::Json(Value::String(v)) => v.clone(),
                    Body::Text(v) => v.clone(),
                    _ => {
                        return Err(AppError::Validation(
                            "dist-tag body must be a version string".into(),
                        ))
                    }
                };
                info!(package = %pkg, tag = %tag, version = %version, "Setting dist-tag");
                meta.dist_tags.insert(tag.to_string(), version);
            }
            None => {
                let tags = match request.body.as_json() {
                    Some(Value::Object(map)) => map.clone(),
                    _ => {
                        return Err(AppError::Validation(
                            "dist-tags body must be a tag/version object".into(),
                        ))
                    }
                };
                for (tag, version) in tags {
                    let version = version
                        .as_str()
                        .ok_or_else(|| {
                            AppError::Validation(format!("dist-tag {tag} must map to a string"))
                        })?
                        .to_string();
                    meta.dist_tags.insert(tag, version);
                }
            }
        }

        self.storage.meta.write_meta(pkg, &meta, None).await?;
        Ok(Response::ok())
    }

    /// `PUT /{pkg}/-rev/{rev}` — snapshot the current record under the
    /// given revision, then store the request body as the new primary.
    /// 404 without mutation when the package is unknown.
    async fn put_revision(&self, request: &Request, pkg: &str, rev: &str) -> AppResult<Response> {
        validate_package_name(pkg)?;
        let current = match self.storage.meta.get_meta(pkg).await? {
            Some(current) => current,
            None => return Ok(Response::status(StatusCode::NOT_FOUND)),
        };

        self.storage.meta.write_meta(pkg, &current, Some(rev)).await?;

        let replacement = request
            .body
            .as_json()
            .ok_or_else(|| AppError::Validation("Revision body must be a JSON document".into()))?
            .clone();
        let replacement: Meta = serde_json::from_value(replacement)?;
        self.storage.meta.write_meta(pkg, &replacement, None).await?;
        info!(package = %pkg, rev = %rev, "Replaced package record");
        Ok(Response::ok())
    }

    /// `DELETE /{pkg}/-rev/{rev}` — remove the metadata record and, only
    /// if that succeeds, the package's artifact subtree. Soft failure from
    /// either step yields a 500.
    async fn delete_package(&self, pkg: &str) -> AppResult<Response> {
        validate_package_name(pkg)?;
        let success = if self.storage.meta.delete_meta(pkg).await? {
            let removed = self.storage.files.delete_dir(&format!("/{pkg}")).await?;
            if removed {
                info!(package = %pkg, "Deleted package");
            } else {
                warn!(package = %pkg, "Artifact subtree removal reported nothing removed");
            }
            removed
        } else {
            false
        };
        Ok(Response::status(if success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }))
    }

    /// `GET /{path}` (catch-all) — serve an artifact, filling the local
    /// store from the upstream on miss. This is the actual cache: the
    /// write-back completes before the bytes are returned.
    async fn get_artifact(&self, request: &Request) -> AppResult<Response> {
        validate_artifact_path(&request.path)?;
        if let Some(artifact) = self.storage.files.get_file(&request.path).await? {
            debug!(path = %request.path, size = artifact.len(), "Serving artifact from local storage");
            return Ok(Response::bytes(StatusCode::OK, artifact));
        }

        debug!(path = %request.path, "Artifact not in local storage, consulting upstream");
        let proxied = self.upstream.proxy(request).await?;
        if proxied.status.as_u16() < 400 && !proxied.body.is_empty() {
            self.storage
                .files
                .write_file(&request.path, &proxied.body)
                .await?;
            info!(path = %request.path, size = proxied.body.len(), "Cached artifact from upstream");
        }
        Ok(Response::bytes(proxied.status, proxied.body))
    }

    /// `DELETE /{path}` — remove a single artifact; 500 when the backend
    /// reports nothing was removed.
    async fn delete_artifact(&self, path: &str) -> AppResult<Response> {
        validate_artifact_path(path)?;
        let success = self.storage.files.delete_file(path).await?;
        info!(path = %path, success = success, "Deleted artifact");
        Ok(Response::status(if success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }))
    }

    /// `POST /-/npm/v1/security/audits[/quick]` — proxy passthrough with
    /// the byte body stringified.
    async fn audit(&self, request: &Request) -> AppResult<Response> {
        let proxied = self.upstream.proxy(request).await?;
        if proxied.body.is_empty() {
            return Ok(Response::status(proxied.status));
        }
        let text = String::from_utf8_lossy(&proxied.body).into_owned();
        Ok(Response::text(proxied.status, text))
    }

    /// Login and user-creation routes: verbatim passthrough.
    async fn passthrough(&self, request: &Request) -> AppResult<Response> {
        let proxied = self.upstream.proxy(request).await?;
        Ok(Response::bytes(proxied.status, proxied.body))
    }
}

fn capture(value: &Option<String>, name: &str) -> AppResult<String> {
    value
        .clone()
        .ok_or_else(|| AppError::Internal(format!("Route matched without a {name} capture")))
}
