//! Admission scheduling configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Important-URL list used when no list is configured.
pub const DEFAULT_IMPORTANT_URLS: &str = "./important";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Deliver responses immediately, bypassing the admission queue
    #[serde(default)]
    pub passthrough: bool,
    /// Recorded request order (one URL per line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_order: Option<PathBuf>,
    /// URLs released at high priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub important_urls: Option<PathBuf>,
    /// Prefetched URLs released at low priority (everything else is high)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_urls: Option<PathBuf>,
    /// Force-release a held response after this many milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
    /// Add `x-lowerbound-*` headers describing how each response was released
    #[serde(default)]
    pub annotate_responses: bool,
}

/// Which list drives classification, and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Important(PathBuf),
    Prefetch(PathBuf),
}

impl AdmissionConfig {
    /// A prefetch list selects the prefetch policy; otherwise the important
    /// list is used, falling back to [`DEFAULT_IMPORTANT_URLS`].
    pub fn policy_source(&self) -> PolicySource {
        match (&self.prefetch_urls, &self.important_urls) {
            (Some(prefetch), _) => PolicySource::Prefetch(prefetch.clone()),
            (None, Some(important)) => PolicySource::Important(important.clone()),
            (None, None) => PolicySource::Important(Path::new(DEFAULT_IMPORTANT_URLS).to_path_buf()),
        }
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_uses_important_list() {
        let config = AdmissionConfig::default();
        assert_eq!(
            config.policy_source(),
            PolicySource::Important(PathBuf::from("./important"))
        );
        assert_eq!(config.max_wait(), None);
    }

    #[test]
    fn test_prefetch_list_selects_prefetch_policy() {
        let config = AdmissionConfig {
            prefetch_urls: Some(PathBuf::from("prefetch_urls")),
            ..Default::default()
        };
        assert_eq!(
            config.policy_source(),
            PolicySource::Prefetch(PathBuf::from("prefetch_urls"))
        );
    }

    #[test]
    fn test_max_wait_conversion() {
        let config = AdmissionConfig {
            max_wait_ms: Some(1500),
            ..Default::default()
        };
        assert_eq!(config.max_wait(), Some(Duration::from_millis(1500)));
    }
}
