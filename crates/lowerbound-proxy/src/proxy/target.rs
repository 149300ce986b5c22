//! Upstream target resolution and the URL key used for admission.

use hyper::http::uri::{Authority, PathAndQuery, Scheme};
use hyper::header::HeaderValue;
use hyper::Uri;
use std::fmt;

/// Where an intercepted request goes, and the key its response is admitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path_and_query: PathAndQuery,
}

impl Target {
    /// Resolve an absolute-form request URI (`GET http://host/path HTTP/1.1`).
    pub fn from_absolute(uri: &Uri) -> Option<Self> {
        let scheme = uri.scheme()?;
        if *scheme != Scheme::HTTP && *scheme != Scheme::HTTPS {
            return None;
        }
        let authority = uri.authority()?;
        Some(Self::new(scheme.clone(), authority, uri.path_and_query()))
    }

    /// Resolve an origin-form request received inside an intercepted tunnel.
    ///
    /// The `Host` header names the origin when present; the CONNECT authority
    /// is the fallback.
    pub fn from_origin(
        scheme: Scheme,
        tunnel: &Authority,
        uri: &Uri,
        host: Option<&HeaderValue>,
    ) -> Self {
        let authority = host
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Authority>().ok())
            .unwrap_or_else(|| tunnel.clone());

        // A Host header without a port inherits the tunnel's port.
        let mut target = Self::new(scheme, &authority, uri.path_and_query());
        if authority.port_u16().is_none() {
            target.port = tunnel
                .port_u16()
                .filter(|port| Some(*port) != default_port(&target.scheme));
        }
        target
    }

    fn new(scheme: Scheme, authority: &Authority, path_and_query: Option<&PathAndQuery>) -> Self {
        let port = authority
            .port_u16()
            .filter(|port| Some(*port) != default_port(&scheme));
        Self {
            host: authority.host().to_ascii_lowercase(),
            port,
            path_and_query: path_and_query
                .cloned()
                .unwrap_or_else(|| PathAndQuery::from_static("/")),
            scheme,
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| default_port(&self.scheme))
            .unwrap_or(80)
    }

    /// `host[:port]` with the default port omitted, suitable for a `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Absolute URI for the upstream client.
    pub fn to_uri(&self) -> Result<Uri, hyper::http::Error> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority())
            .path_and_query(self.path_and_query.clone())
            .build()
    }
}

/// The admission key: `scheme://host[:port]/path?query`.
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme,
            self.authority(),
            self.path_and_query
        )
    }
}

fn default_port(scheme: &Scheme) -> Option<u16> {
    if *scheme == Scheme::HTTP {
        Some(80)
    } else if *scheme == Scheme::HTTPS {
        Some(443)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_form_key() {
        let uri: Uri = "http://Example.test/styles/main.css?v=3".parse().unwrap();
        let target = Target::from_absolute(&uri).unwrap();
        assert_eq!(target.to_string(), "http://example.test/styles/main.css?v=3");
        assert_eq!(target.port(), 80);
    }

    #[test]
    fn test_default_port_omitted() {
        let uri: Uri = "http://example.test:80/".parse().unwrap();
        assert_eq!(
            Target::from_absolute(&uri).unwrap().to_string(),
            "http://example.test/"
        );

        let uri: Uri = "http://example.test:8080".parse().unwrap();
        let target = Target::from_absolute(&uri).unwrap();
        assert_eq!(target.to_string(), "http://example.test:8080/");
        assert_eq!(target.port(), 8080);
    }

    #[test]
    fn test_origin_form_rejected_as_absolute() {
        let uri: Uri = "/index.html".parse().unwrap();
        assert!(Target::from_absolute(&uri).is_none());

        let uri: Uri = "ftp://example.test/file".parse().unwrap();
        assert!(Target::from_absolute(&uri).is_none());
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let tunnel: Authority = "example.test:443".parse().unwrap();
        let uri: Uri = "/app.js".parse().unwrap();
        let host = HeaderValue::from_static("cdn.example.test");

        let target = Target::from_origin(Scheme::HTTPS, &tunnel, &uri, Some(&host));
        assert_eq!(target.to_string(), "https://cdn.example.test/app.js");
        assert_eq!(target.port(), 443);
    }

    #[test]
    fn test_origin_form_falls_back_to_tunnel_authority() {
        let tunnel: Authority = "example.test:8443".parse().unwrap();
        let uri: Uri = "/".parse().unwrap();

        let target = Target::from_origin(Scheme::HTTPS, &tunnel, &uri, None);
        assert_eq!(target.to_string(), "https://example.test:8443/");
        assert_eq!(
            target.to_uri().unwrap().to_string(),
            "https://example.test:8443/"
        );
    }
}
