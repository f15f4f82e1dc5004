//! Abstract request/response shape exchanged with the HTTP binding.
//!
//! The engine never sees the transport: the binding converts whatever the
//! framework hands it into a [`Request`], and renders the [`Response`] back
//! onto the wire. A request is immutable once dispatched; a response is
//! produced exactly once per request.

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

/// Request or response payload. JSON bodies arrive pre-parsed from the
/// binding; everything else stays as raw bytes.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Json(v) => v.is_null(),
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
        }
    }

    /// The parsed JSON value, if this body carries one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// An inbound request in the engine's abstract shape.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Body,
}

impl Request {
    /// Bodyless request, mostly for reads.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body: Body::Empty,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_json(self, value: Value) -> Self {
        self.with_body(Body::Json(value))
    }
}

/// The engine's answer, rendered onto the transport by the binding.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Body,
}

impl Response {
    pub fn status(status: StatusCode) -> Self {
        Response {
            status,
            body: Body::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn json(status: StatusCode, value: Value) -> Self {
        Response {
            status,
            body: Body::Json(value),
        }
    }

    pub fn bytes(status: StatusCode, bytes: Bytes) -> Self {
        Response {
            status,
            body: Body::Bytes(bytes),
        }
    }

    pub fn text(status: StatusCode, text: String) -> Self {
        Response {
            status,
            body: Body::Text(text),
        }
    }
}
