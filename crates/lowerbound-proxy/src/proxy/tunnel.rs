//! CONNECT tunnels: intercepted with the MITM certificate, or relayed.

use super::forwarding::{empty, error_response, ProxyBody};
use super::handler::{handle_intercepted, ProxyContext};
use crate::metrics;
use hyper::body::Incoming;
use hyper::http::uri::Authority;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, warn};

/// Answer a CONNECT with `200` and take over the connection once upgraded.
pub fn handle_connect(ctx: Arc<ProxyContext>, req: Request<Incoming>) -> Response<ProxyBody> {
    let Some(authority) = req.uri().authority().cloned() else {
        warn!("CONNECT without an authority: {}", req.uri());
        metrics::record_request("CONNECT", StatusCode::BAD_REQUEST.as_u16());
        return error_response(StatusCode::BAD_REQUEST, "CONNECT target must be host:port");
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => match ctx.mitm.clone() {
                Some(acceptor) => intercept(ctx, acceptor, upgraded, authority).await,
                None => relay(upgraded, authority).await,
            },
            Err(e) => error!("CONNECT upgrade to {} failed: {}", authority, e),
        }
    });

    metrics::record_request("CONNECT", StatusCode::OK.as_u16());
    Response::new(empty())
}

/// Terminate TLS inside the tunnel and serve the decrypted requests.
async fn intercept(
    ctx: Arc<ProxyContext>,
    acceptor: TlsAcceptor,
    upgraded: Upgraded,
    authority: Authority,
) {
    let tls_stream = match acceptor.accept(TokioIo::new(upgraded)).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("TLS handshake for intercepted {} failed: {}", authority, e);
            return;
        }
    };
    debug!("Intercepting tunnel to {}", authority);

    let conn_authority = authority.clone();
    let service = service_fn(move |req| {
        let ctx = Arc::clone(&ctx);
        let authority = conn_authority.clone();
        async move { handle_intercepted(ctx, authority, req).await }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
    {
        debug!("Intercepted connection to {} closed: {}", authority, e);
    }
}

/// Copy bytes both ways between the client and the origin.
async fn relay(upgraded: Upgraded, authority: Authority) {
    let mut server = match TcpStream::connect(authority.as_str()).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to connect tunnel to {}: {}", authority, e);
            return;
        }
    };

    let mut client = TokioIo::new(upgraded);
    match tokio::io::copy_bidirectional(&mut client, &mut server).await {
        Ok((from_client, from_server)) => debug!(
            "Tunnel to {} closed: {} bytes up, {} bytes down",
            authority, from_client, from_server
        ),
        Err(e) => debug!("Tunnel to {} closed with error: {}", authority, e),
    }
}
