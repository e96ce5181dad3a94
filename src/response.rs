//! The captured response an assertion runs against.

use std::borrow::Cow;

use axum::body::Bytes;
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::FixtureError;

/// A fully buffered snapshot of the response to the act step: status,
/// headers, and body bytes. The body can be deserialized any number of
/// times, so independent body assertions never contend over a stream.
#[derive(Clone, Debug)]
pub struct ResponseSnapshot {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseSnapshot {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as a string, when present and valid UTF-8.
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FixtureError> {
        serde_json::from_slice(&self.body).map_err(FixtureError::from)
    }
}
