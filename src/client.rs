//! The in-memory client used to execute the act step.
//!
//! Requests never touch a socket: the host's router is cloned and driven
//! through `tower::ServiceExt::oneshot`, then the response is buffered into
//! a [`ResponseSnapshot`]. Redirects are followed in memory.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use crate::error::FixtureError;
use crate::request::{RequestBody, RequestSpec};
use crate::response::ResponseSnapshot;

/// Options for the in-memory client, frozen when the host is built.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Path prefix prepended to every request URI.
    pub base_path: String,
    /// Headers applied to every request that does not set them itself.
    pub default_headers: Vec<(HeaderName, HeaderValue)>,
    /// Whether 3xx responses are followed in memory.
    pub follow_redirects: bool,
    /// Maximum redirect hops before the response is returned as-is.
    pub max_redirects: usize,
    /// Per-request deadline. `None` means a hung handler hangs the test.
    pub timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            default_headers: Vec::new(),
            follow_redirects: true,
            max_redirects: 7,
            timeout: None,
        }
    }
}

pub(crate) async fn send(
    router: &Router,
    options: &ClientOptions,
    spec: &RequestSpec,
) -> Result<ResponseSnapshot, FixtureError> {
    let mut method = spec.method.clone();
    let mut uri = join_path(&options.base_path, &spec.uri);
    let mut body = spec.body.clone();
    let mut hops = 0;

    loop {
        let request = build_request(&method, &uri, &body, &spec.headers, &options.default_headers)?;
        let response = dispatch(router.clone(), request, options.timeout).await?;

        if options.follow_redirects && response.status().is_redirection() && hops < options.max_redirects
        {
            if let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                (method, body) = redirected(method, body, response.status());
                uri = location.to_string();
                hops += 1;
                continue;
            }
        }

        return snapshot(response).await;
    }
}

async fn dispatch(
    router: Router,
    request: Request<Body>,
    timeout: Option<Duration>,
) -> Result<Response, FixtureError> {
    let pending = router.oneshot(request);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, pending)
            .await
            .map_err(|_| FixtureError::Timeout(limit))?,
        None => pending.await,
    };
    Ok(outcome.unwrap_or_else(|never| match never {}))
}

fn build_request(
    method: &Method,
    uri: &str,
    body: &Option<RequestBody>,
    headers: &[(HeaderName, HeaderValue)],
    default_headers: &[(HeaderName, HeaderValue)],
) -> Result<Request<Body>, FixtureError> {
    let builder = Request::builder().method(method.clone()).uri(uri);
    let mut request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, body.content_type.clone())
            .body(Body::from(body.bytes.clone())),
        None => builder.body(Body::empty()),
    }
    .map_err(|e| FixtureError::Transport(e.into()))?;

    for (name, value) in headers {
        request.headers_mut().append(name.clone(), value.clone());
    }
    for (name, value) in default_headers {
        if !request.headers().contains_key(name) {
            request.headers_mut().insert(name.clone(), value.clone());
        }
    }
    Ok(request)
}

/// 303 always re-issues as a bodyless GET; 301/302 do the same for anything
/// but GET/HEAD; 307/308 preserve the method and body.
fn redirected(
    method: Method,
    body: Option<RequestBody>,
    status: StatusCode,
) -> (Method, Option<RequestBody>) {
    match status {
        StatusCode::SEE_OTHER => (Method::GET, None),
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
            if method != Method::GET && method != Method::HEAD =>
        {
            (Method::GET, None)
        }
        _ => (method, body),
    }
}

async fn snapshot(response: Response) -> Result<ResponseSnapshot, FixtureError> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| FixtureError::Transport(e.into()))?;
    Ok(ResponseSnapshot::new(parts.status, parts.headers, bytes))
}

fn join_path(base: &str, uri: &str) -> String {
    let base = base.trim_matches('/');
    let relative = uri.trim_start_matches('/');
    if base.is_empty() {
        format!("/{relative}")
    } else {
        format!("/{base}/{relative}")
    }
}
