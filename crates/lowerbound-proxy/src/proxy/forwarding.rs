//! Request forwarding to origin servers.

use super::client::HttpClient;
use super::headers::strip_hop_by_hop;
use super::target::Target;
use crate::metrics;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, error};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// JSON error response, `{"error": "..."}`.
///
/// `message` is embedded without escaping, so it is limited to fixed strings.
pub fn error_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let body = format!(r#"{{"error": "{message}"}}"#);
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream URI: {0}")]
    Target(#[from] hyper::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl ForwardError {
    pub fn into_response(self) -> Response<ProxyBody> {
        match self {
            ForwardError::Target(_) => {
                error_response(StatusCode::BAD_REQUEST, "Invalid request target")
            }
            ForwardError::Upstream(_) => error_response(StatusCode::BAD_GATEWAY, "Bad Gateway"),
        }
    }
}

/// Forward a request to `target` with streaming bodies in both directions.
pub async fn forward(
    http_client: &HttpClient,
    req: Request<Incoming>,
    target: &Target,
) -> Result<Response<ProxyBody>, ForwardError> {
    let (mut parts, body) = req.into_parts();

    parts.uri = target.to_uri()?;
    parts.version = hyper::Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    if let Ok(host) = HeaderValue::from_str(&target.authority()) {
        parts.headers.insert(HOST, host);
    }

    debug!("Forwarding {} {}", parts.method, target);

    let method = parts.method.clone();
    let upstream_req = Request::from_parts(parts, body.boxed());
    let started = Instant::now();

    let upstream_response = http_client.request(upstream_req).await.map_err(|e| {
        error!("Failed to forward request to {}: {}", target, e);
        ForwardError::Upstream(e)
    })?;

    let (mut parts, body) = upstream_response.into_parts();
    metrics::record_upstream_duration(
        method.as_str(),
        parts.status.as_u16(),
        started.elapsed().as_secs_f64() * 1000.0,
    );
    strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, body.boxed()))
}
