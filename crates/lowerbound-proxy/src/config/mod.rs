//! Configuration types for lowerbound-proxy.
//!
//! A YAML file can provide every setting; command-line flags override it
//! (see [`crate::cli`]).

mod admission;
mod listen;
mod upstream;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use admission::{AdmissionConfig, PolicySource, DEFAULT_IMPORTANT_URLS};
pub use listen::{ListenConfig, MetricsConfig, TlsConfig};
pub use upstream::UpstreamConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref tls) = self.listen.tls {
            if tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "MITM TLS needs both 'listen.tls.cert_path' and 'listen.tls.key_path'"
                        .to_string(),
                ));
            }
        }

        if self.admission.important_urls.is_some() && self.admission.prefetch_urls.is_some() {
            return Err(ConfigError::Invalid(
                "'admission.important_urls' and 'admission.prefetch_urls' select different \
                 classification policies; configure only one"
                    .to_string(),
            ));
        }

        if self.admission.max_wait_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "'admission.max_wait_ms' must be greater than zero".to_string(),
            ));
        }

        if self.metrics.port.is_some() && self.metrics.port == Some(self.listen.port) {
            return Err(ConfigError::Invalid(format!(
                "metrics port {} collides with the proxy listen port",
                self.listen.port
            )));
        }

        Ok(())
    }
}
