//! Listen, metrics, and TLS configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Certificate used to terminate intercepted CONNECT tunnels
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate chain (PEM format)
    pub cert_path: PathBuf,
    /// Path to TLS private key (PEM format)
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_port")]
    pub port: u16,
    /// MITM certificate; without it CONNECT tunnels are relayed untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

fn default_listen_port() -> u16 {
    8443
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Port for the Prometheus endpoint; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}
