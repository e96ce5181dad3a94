//! The act step: a description of the single outbound HTTP request.

use axum::http::{HeaderName, HeaderValue, Method};
use serde::Serialize;

#[derive(Clone, Debug)]
pub(crate) struct RequestBody {
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_type: HeaderValue,
}

/// A pending request descriptor.
///
/// Holds the method, a host-relative URI, optional headers, and an optional
/// pre-serialized body. Consumed exactly once by `run`.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) body: Option<RequestBody>,
}

impl RequestSpec {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn patch(uri: impl Into<String>) -> Self {
        Self::new(Method::PATCH, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Appends a header to the request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Appends a query-string pair to the URI.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        let separator = if self.uri.contains('?') { '&' } else { '?' };
        self.uri = format!("{}{}{}={}", self.uri, separator, key, value.to_string());
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody {
            bytes: serde_json::to_vec(body)?,
            content_type: HeaderValue::from_static("application/json"),
        });
        Ok(self)
    }

    /// Attaches a raw, pre-serialized body.
    pub fn with_raw_body(mut self, bytes: impl Into<Vec<u8>>, content_type: HeaderValue) -> Self {
        self.body = Some(RequestBody {
            bytes: bytes.into(),
            content_type,
        });
        self
    }
}
