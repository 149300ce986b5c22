//! Command-line arguments.

use crate::config::{Config, ConfigError, TlsConfig};
use clap::Parser;
use std::path::PathBuf;

/// Intercepting proxy that releases responses in recorded fetch order
#[derive(Parser, Debug, Default)]
#[command(name = "lowerbound-proxy")]
#[command(author, version, about)]
pub struct Args {
    /// YAML configuration file; flags given on the command line override it
    #[arg(short, long, env = "LOWERBOUND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen port [default: 8443]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// PEM certificate used to intercept CONNECT tunnels
    #[arg(long = "cert-file", alias = "cert_file")]
    pub cert_file: Option<PathBuf>,

    /// PEM private key for --cert-file
    #[arg(long = "key-file", alias = "key_file")]
    pub key_file: Option<PathBuf>,

    /// Newline-delimited URLs released at high priority [default: ./important]
    #[arg(long, alias = "important_urls", conflicts_with = "prefetch_urls")]
    pub important_urls: Option<PathBuf>,

    /// Newline-delimited prefetched URLs; selects the prefetch policy
    #[arg(long, alias = "prefetch_urls")]
    pub prefetch_urls: Option<PathBuf>,

    /// Recorded request order, one URL per line
    #[arg(long, alias = "request_order")]
    pub request_order: Option<PathBuf>,

    /// Deliver responses immediately without scheduling
    #[arg(long)]
    pub passthrough: bool,

    /// Force-release a held response after this many milliseconds
    #[arg(long)]
    pub max_wait_ms: Option<u64>,

    /// Add x-lowerbound-* headers describing how each response was released
    #[arg(long)]
    pub annotate_responses: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Skip certificate verification towards origin servers
    #[arg(long)]
    pub insecure_upstream: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Load the config file (if any) and apply the flags on top of it.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.listen.port = port;
        }

        match (self.cert_file, self.key_file) {
            (Some(cert_path), Some(key_path)) => {
                config.listen.tls = Some(TlsConfig {
                    cert_path,
                    key_path,
                });
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "--cert-file and --key-file must be given together".to_string(),
                ))
            }
        }

        // A list flag selects its policy, replacing whichever the file chose.
        if let Some(path) = self.important_urls {
            config.admission.important_urls = Some(path);
            config.admission.prefetch_urls = None;
        }
        if let Some(path) = self.prefetch_urls {
            config.admission.prefetch_urls = Some(path);
            config.admission.important_urls = None;
        }
        if let Some(path) = self.request_order {
            config.admission.request_order = Some(path);
        }
        if self.passthrough {
            config.admission.passthrough = true;
        }
        if let Some(ms) = self.max_wait_ms {
            config.admission.max_wait_ms = Some(ms);
        }
        if self.annotate_responses {
            config.admission.annotate_responses = true;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.port = Some(port);
        }
        if self.insecure_upstream {
            config.upstream.tls_skip_verify = true;
        }

        config.validate()?;
        Ok(config)
    }
}
