//! Response classification and the admission gate in front of the queue.
//!
//! The proxy asks the [`AdmissionGate`] when it may deliver each intercepted
//! response. In passthrough mode the answer is always "now"; otherwise the
//! response's URL is classified with a [`ClassificationPolicy`] and submitted
//! to the [`AdmissionQueue`].

use crate::admission::{AdmissionError, AdmissionQueue, Priority, QueueConfig, Release};
use crate::config::{AdmissionConfig, PolicySource};
use crate::schedule::{Schedule, UrlSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Decides the admission priority of a response URL.
#[derive(Debug, Clone)]
pub enum ClassificationPolicy {
    /// URLs in the set are `High`, everything else `Low`.
    Important(UrlSet),
    /// URLs in the set were prefetched and go `Low`, everything else `High`.
    Prefetch(UrlSet),
}

impl ClassificationPolicy {
    pub fn classify(&self, url: &str) -> Priority {
        let high = match self {
            ClassificationPolicy::Important(important) => important.contains(url),
            ClassificationPolicy::Prefetch(prefetched) => !prefetched.contains(url),
        };
        if high {
            Priority::High
        } else {
            Priority::Low
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassificationPolicy::Important(_) => "important",
            ClassificationPolicy::Prefetch(_) => "prefetch",
        }
    }
}

/// Result of passing a response through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Passthrough mode: delivered without queuing.
    Bypassed,
    /// Held by the queue until released.
    Released {
        priority: Priority,
        release: Release,
        waited: Duration,
    },
}

impl Admission {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Admission::Released { .. })
    }
}

/// Gate every intercepted response passes before it is written to the client.
pub enum AdmissionGate {
    Passthrough,
    Scheduled {
        queue: AdmissionQueue,
        policy: ClassificationPolicy,
    },
}

impl AdmissionGate {
    pub fn scheduled(queue: AdmissionQueue, policy: ClassificationPolicy) -> Self {
        AdmissionGate::Scheduled { queue, policy }
    }

    /// Load the configured lists and start the queue. Any unreadable list fails
    /// the whole construction.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, AdmissionError> {
        if config.passthrough {
            info!("Passthrough mode: responses are delivered without scheduling");
            return Ok(AdmissionGate::Passthrough);
        }

        let policy = match config.policy_source() {
            PolicySource::Important(path) => {
                let urls = UrlSet::load(&path)?;
                info!("Loaded {} important URLs from {}", urls.len(), path.display());
                ClassificationPolicy::Important(urls)
            }
            PolicySource::Prefetch(path) => {
                let urls = UrlSet::load(&path)?;
                info!("Loaded {} prefetch URLs from {}", urls.len(), path.display());
                ClassificationPolicy::Prefetch(urls)
            }
        };

        let schedule = match &config.request_order {
            Some(path) => {
                let schedule = Schedule::load(path)?;
                info!(
                    "Loaded request order with {} URLs from {}",
                    schedule.len(),
                    path.display()
                );
                schedule
            }
            None => Schedule::default(),
        };

        let queue_config = QueueConfig {
            max_wait: config.max_wait(),
            start_paused: false,
        };
        Ok(Self::scheduled(
            AdmissionQueue::new(schedule, queue_config)?,
            policy,
        ))
    }

    /// Wait until the response for `url` may be delivered.
    pub async fn admit(&self, url: &str) -> Admission {
        match self {
            AdmissionGate::Passthrough => Admission::Bypassed,
            AdmissionGate::Scheduled { queue, policy } => {
                let priority = policy.classify(url);
                let started = Instant::now();
                let release = queue.submit(priority, url).await;
                let waited = started.elapsed();
                debug!(
                    "Admitted {} as {} ({}) after {:?}",
                    url, priority, release, waited
                );
                Admission::Released {
                    priority,
                    release,
                    waited,
                }
            }
        }
    }

    pub fn queue(&self) -> Option<&AdmissionQueue> {
        match self {
            AdmissionGate::Passthrough => None,
            AdmissionGate::Scheduled { queue, .. } => Some(queue),
        }
    }

    /// Release everything still held and stop the dispatcher.
    pub fn shutdown(&self) {
        if let Some(queue) = self.queue() {
            queue.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn list(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_important_policy() {
        let policy = ClassificationPolicy::Important(["https://a.test/main.css"].into_iter().collect());
        assert_eq!(policy.classify("https://a.test/main.css"), Priority::High);
        assert_eq!(policy.classify("https://a.test/ad.js"), Priority::Low);
        assert_eq!(policy.name(), "important");
    }

    #[test]
    fn test_prefetch_policy_inverts_membership() {
        let policy = ClassificationPolicy::Prefetch(["https://a.test/next.js"].into_iter().collect());
        assert_eq!(policy.classify("https://a.test/next.js"), Priority::Low);
        assert_eq!(policy.classify("https://a.test/"), Priority::High);
    }

    #[tokio::test]
    async fn test_passthrough_bypasses_queue() {
        let config = AdmissionConfig {
            passthrough: true,
            important_urls: Some(PathBuf::from("/nonexistent/important")),
            ..Default::default()
        };
        let gate = AdmissionGate::from_config(&config).unwrap();
        assert!(gate.queue().is_none());
        assert_eq!(gate.admit("https://a.test/").await, Admission::Bypassed);
        gate.shutdown();
    }

    #[tokio::test]
    async fn test_scheduled_gate_classifies_and_releases() {
        let important = list(&["https://a.test/"]);
        let order = list(&["https://a.test/", "https://a.test/app.js"]);
        let config = AdmissionConfig {
            important_urls: Some(important.path().to_path_buf()),
            request_order: Some(order.path().to_path_buf()),
            ..Default::default()
        };
        let gate = AdmissionGate::from_config(&config).unwrap();

        match gate.admit("https://a.test/").await {
            Admission::Released {
                priority, release, ..
            } => {
                assert_eq!(priority, Priority::High);
                assert_eq!(release, Release::Dispatched);
            }
            other => panic!("expected a scheduled admission, got {other:?}"),
        }
        let queue = gate.queue().unwrap();
        assert_eq!(queue.schedule().len(), 2);
        assert_eq!(queue.cursor(), 0);

        let admission = gate.admit("https://a.test/app.js").await;
        assert!(admission.is_scheduled());
        assert_eq!(gate.queue().unwrap().cursor(), 1);
        gate.shutdown();
    }

    #[test]
    fn test_missing_list_fails_construction() {
        let config = AdmissionConfig {
            important_urls: Some(PathBuf::from("/nonexistent/important")),
            ..Default::default()
        };
        assert!(matches!(
            AdmissionGate::from_config(&config),
            Err(AdmissionError::Schedule(_))
        ));
    }

    #[test]
    fn test_missing_request_order_fails_construction() {
        let important = list(&["https://a.test/"]);
        let config = AdmissionConfig {
            important_urls: Some(important.path().to_path_buf()),
            request_order: Some(PathBuf::from("/nonexistent/order")),
            ..Default::default()
        };
        assert!(AdmissionGate::from_config(&config).is_err());
    }
}
