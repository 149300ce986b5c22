//! ProxyServer struct and main run loop.

use super::client::create_http_client;
use super::forwarding::{full, ProxyBody};
use super::handler::{handle_request, ProxyContext};
use super::network::create_listener;
use super::tls::create_mitm_acceptor;
use crate::classify::AdmissionGate;
use crate::config::Config;
use crate::metrics::collect_metrics;
use anyhow::Context;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// The main proxy server struct.
pub struct ProxyServer {
    config: Config,
    ctx: Arc<ProxyContext>,
}

impl ProxyServer {
    /// Build the upstream client, load the admission lists, and load the MITM
    /// certificate. Any failure here is fatal to startup.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let http_client = create_http_client(&config.upstream)?;
        let gate = AdmissionGate::from_config(&config.admission)
            .context("Failed to initialise the admission queue")?;

        let mitm = match config.listen.tls {
            Some(ref tls) => {
                let acceptor = create_mitm_acceptor(&tls.cert_path, &tls.key_path)?;
                info!(
                    "Intercepting CONNECT tunnels with certificate {}",
                    tls.cert_path.display()
                );
                Some(acceptor)
            }
            None => {
                info!("No MITM certificate configured; CONNECT tunnels are relayed");
                None
            }
        };

        let annotate = config.admission.annotate_responses;
        Ok(Self {
            config,
            ctx: Arc::new(ProxyContext {
                http_client,
                gate: Arc::new(gate),
                mitm,
                annotate,
            }),
        })
    }

    /// Handle used to drain the admission queue at shutdown.
    pub fn gate(&self) -> Arc<AdmissionGate> {
        Arc::clone(&self.ctx.gate)
    }

    /// Bind the configured port and serve until an accept error.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen.port));
        let listener = create_listener(addr)
            .with_context(|| format!("Failed to bind proxy listener on {addr}"))?;

        if let Some(port) = self.config.metrics.port {
            let metrics_addr = SocketAddr::from(([0, 0, 0, 0], port));
            let metrics_listener = TcpListener::bind(metrics_addr)
                .await
                .with_context(|| format!("Failed to bind metrics listener on {metrics_addr}"))?;
            info!("Metrics available at http://{}/metrics", metrics_addr);
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(metrics_listener).await {
                    error!("Metrics endpoint stopped: {}", e);
                }
            });
        }

        self.serve(listener).await
    }

    /// Accept proxy connections on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Proxy listening on {}", listener.local_addr()?);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let ctx = Arc::clone(&self.ctx);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(Arc::clone(&ctx), req));

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }
}

/// Serve the Prometheus registry at `GET /metrics`.
pub async fn serve_metrics(listener: TcpListener) -> Result<(), anyhow::Error> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(metrics_response);
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Metrics connection error: {}", e);
            }
        });
    }
}

async fn metrics_response(req: Request<Incoming>) -> Result<Response<ProxyBody>, Infallible> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        let mut response = Response::new(full("Not Found"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    }

    let mut response = Response::new(full(collect_metrics()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}
