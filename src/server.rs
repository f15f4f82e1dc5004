//! HTTP binding for the registry engine.
//!
//! The engine owns routing, so the axum app is a single catch-all: every
//! inbound request is converted to the engine's abstract request shape,
//! dispatched, and the engine's answer rendered back onto the wire. Errors
//! surface as the standardized JSON error body via [`AppError`]'s
//! `IntoResponse`.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response as AxumResponse},
    Router,
};
use flate2::read::GzDecoder;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::RegistryConfig;
use crate::error::AppError;
use crate::local_storage::LocalStorage;
use crate::provider::Storage;
use crate::registry::Registry;
use crate::types::{Body, Request, Response};

/// Build the axum application around a registry engine.
pub fn build_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .fallback(dispatch_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn dispatch_handler(
    State(registry): State<Arc<Registry>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    bytes: Bytes,
) -> AxumResponse {
    let request = match convert_request(method, &uri, headers, bytes) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    match registry.handle(request).await {
        Ok(response) => render_response(response),
        Err(e) => e.into_response(),
    }
}

/// Convert the wire request into the engine's shape. A gzip body is
/// decompressed here so the engine and merge logic only ever see plain
/// payloads; the content-encoding header stays on the request so a proxied
/// forward is re-compressed.
fn convert_request(
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Request, AppError> {
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let body = parse_body(&headers, bytes)?;

    Ok(Request {
        method,
        // The raw path keeps the encoded scope separator (%2f) intact for
        // the route table to decode
        path: uri.path().to_string(),
        headers,
        query,
        body,
    })
}

fn parse_body(headers: &HeaderMap, bytes: Bytes) -> Result<Body, AppError> {
    if bytes.is_empty() {
        return Ok(Body::Empty);
    }

    let bytes = if is_gzip(headers) {
        let mut decoder = GzDecoder::new(bytes.as_ref());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| {
            warn!(error = %e, "Failed to decompress request body");
            AppError::Validation(format!("Invalid gzip request body: {e}"))
        })?;
        Bytes::from(out)
    } else {
        bytes
    };

    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        return Ok(Body::Json(value));
    }
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Ok(Body::Text(text)),
        Err(_) => Ok(Body::Bytes(bytes)),
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

fn render_response(response: Response) -> AxumResponse {
    let status = response.status;
    match response.body {
        Body::Empty => status.into_response(),
        Body::Json(value) => (status, Json(value)).into_response(),
        Body::Text(text) => (status, text).into_response(),
        Body::Bytes(bytes) => (
            status,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
    }
}

/// Start the registry server and block until it exits.
pub async fn run_server(config: RegistryConfig) -> Result<()> {
    info!("Starting Satchel Registry");

    let abs_data_dir = match std::fs::canonicalize(&config.data_dir) {
        Ok(path) => path,
        Err(_) => {
            std::fs::create_dir_all(&config.data_dir)?;
            std::env::current_dir()?.join(&config.data_dir)
        }
    };
    info!(data_dir = %abs_data_dir.display(), "Using data directory");

    let host = config.server.host.clone();
    let port = config.server.port;

    let storage = Storage::combined(LocalStorage::new(&abs_data_dir));
    let registry = Arc::new(Registry::new(config, storage)?);
    let app = build_router(registry);

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {addr}: {e}")
    })?;

    println!("🚀 Satchel Registry is running on http://{host}:{port}");
    println!("📂 Data directory: {}", abs_data_dir.display());
    println!();
    println!("📋 Point npm at it:");
    println!("   npm config set registry http://{host}:{port}/");

    info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await.map_err(|e| {
        error!(error = %e, "Server error");
        anyhow::anyhow!("Server error: {e}")
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_server(dir: &TempDir) -> TestServer {
        let config = RegistryConfig {
            artifacts_url: "http://artifacts.test:8080".to_string(),
            ..RegistryConfig::default()
        };
        let storage = Storage::combined(LocalStorage::new(dir.path()));
        let registry = Arc::new(Registry::new(config, storage).unwrap());
        TestServer::new(build_router(registry)).unwrap()
    }

    fn publish_doc(name: &str) -> Value {
        use base64::{engine::general_purpose, Engine as _};
        json!({
            "_id": name,
            "name": name,
            "dist-tags": { "latest": "1.0.0" },
            "versions": {
                "1.0.0": {
                    "name": name,
                    "version": "1.0.0",
                    "dist": {
                        "tarball": format!("http://somewhere/{name}/-/{name}-1.0.0.tgz")
                    }
                }
            },
            "_attachments": {
                format!("{name}-1.0.0.tgz"): {
                    "content_type": "application/octet-stream",
                    "data": general_purpose::STANDARD.encode(b"bytes"),
                    "length": 5
                }
            }
        })
    }

    #[tokio::test]
    async fn ping_answers_empty_ok() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let res = server.get("/-/ping").await;
        res.assert_status_ok();
    }

    #[tokio::test]
    async fn publish_and_fetch_over_http() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let res = server.put("/pkg").json(&publish_doc("pkg")).await;
        res.assert_status_ok();

        let res = server.get("/pkg").await;
        res.assert_status_ok();
        let doc: Value = res.json();
        assert_eq!(doc["name"], "pkg");
        assert_eq!(doc["dist-tags"]["latest"], "1.0.0");
    }

    #[tokio::test]
    async fn artifact_downloads_are_octet_stream() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        server.put("/pkg").json(&publish_doc("pkg")).await;

        let res = server.get("/pkg/-/pkg-1.0.0.tgz").await;
        res.assert_status_ok();
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        assert_eq!(res.as_bytes().as_ref(), b"bytes");
    }

    #[tokio::test]
    async fn missing_package_renders_the_error_body() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let res = server.get("/ghost").await;
        res.assert_status(StatusCode::NOT_FOUND);
        let body: Value = res.json();
        assert_eq!(body["code"], "not_found");
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn unroutable_method_renders_route_not_found() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let res = server.post("/pkg").json(&json!({})).await;
        res.assert_status(StatusCode::NOT_FOUND);
        let body: Value = res.json();
        assert_eq!(body["code"], "route_not_found");
    }

    #[tokio::test]
    async fn name_mismatch_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let res = server.put("/other").json(&publish_doc("pkg")).await;
        res.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = res.json();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn gzip_request_bodies_are_decompressed() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let server = test_server(&dir);

        let payload = serde_json::to_vec(&publish_doc("pkg")).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let res = server
            .put("/pkg")
            .add_header(header::CONTENT_ENCODING, "gzip")
            .add_header(header::CONTENT_TYPE, "application/json")
            .bytes(compressed.into())
            .await;
        res.assert_status_ok();

        let res = server.get("/pkg").await;
        res.assert_status_ok();
    }
}
