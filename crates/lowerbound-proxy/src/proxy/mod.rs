//! Intercepting proxy server.
//!
//! Every response fetched through the proxy passes the
//! [`AdmissionGate`](crate::classify::AdmissionGate) before it is written back
//! to the client.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct, accept loop, and metrics endpoint
//! - `handler` - Request dispatch and the admission step
//! - `tunnel` - CONNECT handling (MITM interception or blind relay)
//! - `forwarding` - Request forwarding to origin servers
//! - `target` - Upstream target and admission URL key
//! - `client` - HTTP client creation and configuration
//! - `tls` - Certificate loading and verifiers
//! - `network` - Listener socket setup

mod client;
mod forwarding;
mod handler;
mod headers;
mod network;
mod server;
mod target;
mod tls;
mod tunnel;

pub use forwarding::{error_response, ProxyBody};
pub use headers::{X_LOWERBOUND_PRIORITY, X_LOWERBOUND_RELEASE, X_LOWERBOUND_WAIT_MS};
pub use network::create_listener;
pub use server::{serve_metrics, ProxyServer};
pub use target::Target;
