//! Header names and helpers for proxied exchanges.
//!
//! Responses that passed the admission gate are annotated with how they were
//! scheduled, and hop-by-hop headers are stripped in both directions.

use crate::classify::Admission;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Response;

pub static X_LOWERBOUND_PRIORITY: HeaderName = HeaderName::from_static("x-lowerbound-priority");
pub static X_LOWERBOUND_RELEASE: HeaderName = HeaderName::from_static("x-lowerbound-release");
pub static X_LOWERBOUND_WAIT_MS: HeaderName = HeaderName::from_static("x-lowerbound-wait-ms");

pub static VALUE_BYPASSED: HeaderValue = HeaderValue::from_static("bypassed");

/// Connection-scoped headers a proxy must not forward (RFC 9110 §7.6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
/// `Transfer-Encoding` is left to hyper, which reframes the body itself.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Extension trait for annotating responses.
pub trait ProxyHeadersExt {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Returns false if the value couldn't be converted to a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;

    /// Record how the admission gate handled this response.
    fn set_admission(&mut self, admission: &Admission) {
        match admission {
            Admission::Bypassed => self.set_header(&X_LOWERBOUND_RELEASE, &VALUE_BYPASSED),
            Admission::Released {
                priority,
                release,
                waited,
            } => {
                self.set_header_value(&X_LOWERBOUND_PRIORITY, priority.as_str());
                self.set_header_value(&X_LOWERBOUND_RELEASE, release.as_str());
                self.set_header_value(&X_LOWERBOUND_WAIT_MS, &waited.as_millis().to_string());
            }
        }
    }
}

impl<B> ProxyHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}
