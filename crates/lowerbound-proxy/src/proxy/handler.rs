//! Request handling: forward, pass the admission gate, deliver.
//!
//! Plain proxy requests arrive in absolute form. HTTPS traffic arrives as a
//! CONNECT tunnel (see [`super::tunnel`]); when interception is enabled, the
//! requests inside the tunnel reach [`handle_intercepted`] in origin form.

use super::client::HttpClient;
use super::forwarding::{error_response, forward, ProxyBody};
use super::headers::ProxyHeadersExt;
use super::target::Target;
use super::tunnel;
use crate::classify::AdmissionGate;
use crate::metrics;
use hyper::body::Incoming;
use hyper::http::uri::{Authority, Scheme};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

/// State shared by every connection the proxy serves.
pub struct ProxyContext {
    pub http_client: HttpClient,
    pub gate: Arc<AdmissionGate>,
    /// Terminates CONNECT tunnels; `None` relays them untouched.
    pub mitm: Option<TlsAcceptor>,
    /// Add `x-lowerbound-*` headers to delivered responses.
    pub annotate: bool,
}

/// Entry point for requests on the proxy's listening socket.
pub async fn handle_request(
    ctx: Arc<ProxyContext>,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    debug!("Received request: {} {}", req.method(), req.uri());

    if req.method() == Method::CONNECT {
        return Ok(tunnel::handle_connect(ctx, req));
    }

    match Target::from_absolute(req.uri()) {
        Some(target) => Ok(proxy_exchange(&ctx, req, target).await),
        None => {
            metrics::record_request(req.method().as_str(), StatusCode::BAD_REQUEST.as_u16());
            Ok(error_response(
                StatusCode::BAD_REQUEST,
                "Proxy requests must use an absolute URI",
            ))
        }
    }
}

/// Entry point for requests decrypted from an intercepted tunnel to `tunnel`.
pub async fn handle_intercepted(
    ctx: Arc<ProxyContext>,
    tunnel: Authority,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, Infallible> {
    let target = Target::from_absolute(req.uri()).unwrap_or_else(|| {
        Target::from_origin(
            Scheme::HTTPS,
            &tunnel,
            req.uri(),
            req.headers().get(hyper::header::HOST),
        )
    });
    Ok(proxy_exchange(&ctx, req, target).await)
}

/// Fetch the response, then hold it until the admission gate releases it.
///
/// The response is delivered as the origin sent it unless annotation is on.
/// Upstream failures are delivered at once; there is no response to order.
async fn proxy_exchange(
    ctx: &ProxyContext,
    req: Request<Incoming>,
    target: Target,
) -> Response<ProxyBody> {
    let start_time = Instant::now();
    let method = req.method().clone();

    let response = match forward(&ctx.http_client, req, &target).await {
        Ok(mut response) => {
            let admission = ctx.gate.admit(&target.to_string()).await;
            debug!("Delivering {}: {:?}", target, admission);
            if ctx.annotate {
                response.set_admission(&admission);
            }
            metrics::record_proxy_duration(
                method.as_str(),
                start_time.elapsed().as_secs_f64() * 1000.0,
                admission.is_scheduled(),
            );
            response
        }
        Err(e) => e.into_response(),
    };

    metrics::record_request(method.as_str(), response.status().as_u16());
    response
}
