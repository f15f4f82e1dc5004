//! # Upstream Proxy Client
//!
//! Forwards an inbound request verbatim (method, path, headers, body) to the
//! configured upstream registry and returns the raw status and buffered
//! body. Compressed bodies are handled transparently in both directions:
//! an outgoing body is gzip-compressed when the request carries
//! `content-encoding: gzip`, and a response flagged the same way is
//! decompressed before being returned.
//!
//! No retries and no timeout beyond what the HTTP client enforces; transport
//! failures propagate as upstream errors.

use std::io::{Read, Write};
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::types::{Body, Request};

/// Configuration for the upstream registry connection.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Upstream registry root (e.g. "https://registry.npmjs.org").
    pub url: String,
    /// HTTP request timeout for upstream calls.
    pub timeout: Duration,
    /// Whether upstream lookups are enabled at all.
    pub enabled: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            url: "https://registry.npmjs.org".to_string(),
            timeout: Duration::from_secs(30),
            enabled: true,
        }
    }
}

/// The raw result of a proxied request: status plus fully buffered,
/// already-decompressed body bytes.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// HTTP client for upstream registry communication.
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new upstream client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be created.
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("satchel-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Forward a request to the upstream registry and buffer the response.
    ///
    /// The request path is appended to the configured upstream root; headers
    /// are forwarded with the host rewritten to the upstream's (the client
    /// derives it from the URL). An object body with at least one field is
    /// serialized as JSON; a non-empty string body is sent as-is; anything
    /// else is sent without a body, matching the registry API's publish and
    /// login flows.
    pub async fn proxy(&self, request: &Request) -> AppResult<ProxyResponse> {
        if !self.config.enabled {
            return Err(AppError::NotFound(
                "Upstream registry lookup is disabled in configuration".to_string(),
            ));
        }

        let mut url = format!(
            "{}{}",
            self.config.url.trim_end_matches('/'),
            request.path
        );
        if !request.query.is_empty() {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&request.query)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        debug!(method = %request.method, url = %url, "Proxying request to upstream");

        let mut outbound = self.client.request(request.method.clone(), &url);
        outbound = outbound.headers(forwardable_headers(&request.headers));

        if let Some(body) = serialize_body(&request.body)? {
            let body = if is_gzip(&request.headers) {
                gzip_compress(&body)?
            } else {
                body
            };
            outbound = outbound.body(body);
        }

        let response = outbound.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream request failed");
            AppError::Upstream(format!("Request to {url} failed: {e}"))
        })?;

        let status = response.status();
        let gzipped = is_gzip(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to read upstream body: {e}")))?;

        let body = if gzipped {
            Bytes::from(gzip_decompress(&body)?)
        } else {
            body
        };

        debug!(status = %status, size = body.len(), "Upstream response buffered");
        Ok(ProxyResponse { status, body })
    }
}

/// Copy request headers for forwarding, dropping the ones the client must
/// own: host (rewritten to the upstream's) and content-length (the body may
/// be re-encoded).
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    forwarded.remove(header::HOST);
    forwarded.remove(header::CONTENT_LENGTH);
    forwarded
}

/// Serialize the abstract body per the proxy contract. Returns `None` when
/// nothing should be sent.
fn serialize_body(body: &Body) -> AppResult<Option<Vec<u8>>> {
    match body {
        Body::Json(Value::Object(map)) if !map.is_empty() => {
            Ok(Some(serde_json::to_vec(&Value::Object(map.clone()))?))
        }
        Body::Json(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone().into_bytes())),
        Body::Text(s) if !s.is_empty() => Ok(Some(s.clone().into_bytes())),
        _ => Ok(None),
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

fn gzip_compress(data: &[u8]) -> AppResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| AppError::Upstream(format!("Failed to gzip request body: {e}")))
}

fn gzip_decompress(data: &[u8]) -> AppResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AppError::Upstream(format!("Failed to gunzip upstream body: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::json;
    use std::net::SocketAddr;

    async fn spawn_upstream(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> UpstreamClient {
        UpstreamClient::new(UpstreamConfig {
            url: format!("http://{addr}"),
            timeout: Duration::from_secs(5),
            enabled: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_method_and_path() {
        let app = Router::new().route("/some-package", get(|| async { "metadata" }));
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let response = client
            .proxy(&Request::new(Method::GET, "/some-package"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"metadata");
    }

    #[tokio::test]
    async fn serializes_object_bodies_as_json() {
        let app = Router::new().route(
            "/-/v1/login",
            post(|body: String| async move { body }),
        );
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let request = Request::new(Method::POST, "/-/v1/login")
            .with_json(json!({ "name": "user", "password": "hunter2" }));
        let response = client.proxy(&request).await.unwrap();

        let echoed: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(echoed["name"], "user");
    }

    #[tokio::test]
    async fn query_parameters_are_forwarded() {
        use axum::extract::Query;
        use std::collections::HashMap;

        let app = Router::new().route(
            "/pkg",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                q.get("write").cloned().unwrap_or_default()
            }),
        );
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let mut request = Request::new(Method::GET, "/pkg");
        request.query.insert("write".to_string(), "true".to_string());
        let response = client.proxy(&request).await.unwrap();
        assert_eq!(response.body.as_ref(), b"true");
    }

    #[tokio::test]
    async fn empty_object_body_is_not_sent() {
        let app = Router::new().route(
            "/probe",
            post(|body: String| async move { format!("len={}", body.len()) }),
        );
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let request = Request::new(Method::POST, "/probe").with_json(json!({}));
        let response = client.proxy(&request).await.unwrap();
        assert_eq!(response.body.as_ref(), b"len=0");
    }

    #[tokio::test]
    async fn gzipped_upstream_response_is_decompressed() {
        let app = Router::new().route(
            "/zipped",
            get(|| async {
                let body = gzip_compress(b"inflate me").unwrap();
                ([(header::CONTENT_ENCODING, "gzip")], body)
            }),
        );
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let response = client
            .proxy(&Request::new(Method::GET, "/zipped"))
            .await
            .unwrap();
        assert_eq!(response.body.as_ref(), b"inflate me");
    }

    #[tokio::test]
    async fn gzip_request_body_round_trips() {
        let app = Router::new().route(
            "/audit",
            post(|headers: HeaderMap, body: Bytes| async move {
                assert!(is_gzip(&headers));
                gzip_decompress(&body).unwrap()
            }),
        );
        let addr = spawn_upstream(app).await;

        let client = client_for(addr);
        let mut request = Request::new(Method::POST, "/audit")
            .with_json(json!({ "requires": { "left-pad": "^1.0.0" } }));
        request
            .headers
            .insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());

        let response = client.proxy(&request).await.unwrap();
        let echoed: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(echoed["requires"]["left-pad"], "^1.0.0");
    }

    #[tokio::test]
    async fn disabled_client_refuses_lookups() {
        let client = UpstreamClient::new(UpstreamConfig {
            enabled: false,
            ..UpstreamConfig::default()
        })
        .unwrap();

        let err = client
            .proxy(&Request::new(Method::GET, "/pkg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_an_upstream_error() {
        // Nothing listens on this port
        let client = UpstreamClient::new(UpstreamConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
            enabled: true,
        })
        .unwrap();

        let err = client
            .proxy(&Request::new(Method::GET, "/pkg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
