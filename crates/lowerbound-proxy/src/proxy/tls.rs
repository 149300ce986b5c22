//! TLS utilities for the proxy server.
//!
//! Loads the certificate used to terminate intercepted CONNECT tunnels and
//! provides a no-op verifier for origins with self-signed certificates.

use anyhow::Context;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// The crypto provider used for every TLS config the proxy builds.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// No-op certificate verifier for development/testing with self-signed certificates.
///
/// # Warning
/// This disables all TLS security checks - use only in development!
#[derive(Debug)]
pub struct NoVerifier {
    provider: Arc<CryptoProvider>,
}

impl NoVerifier {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

pub fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open certificate file '{}'", path.display()))?;
    let mut reader = std::io::BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .with_context(|| format!("Failed to parse certificate file '{}'", path.display()))?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in certificate file: {}", path.display());
    }
    Ok(certs)
}

/// Reads the first PKCS#8, PKCS#1, or SEC1 key in the file.
pub fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open private key file '{}'", path.display()))?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to parse private key file '{}'", path.display()))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in key file: {}", path.display()))
}

/// Acceptor terminating intercepted tunnels with the configured certificate.
pub fn create_mitm_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS configuration")?;
    // Intercepted exchanges are served over HTTP/1.1 only.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_no_verifier_supported_schemes() {
        let verifier = NoVerifier::new(crypto_provider());
        let schemes = verifier.supported_verify_schemes();
        assert!(!schemes.is_empty());
        assert!(schemes.contains(&rustls::SignatureScheme::ECDSA_NISTP256_SHA256));
        assert!(schemes.contains(&rustls::SignatureScheme::RSA_PSS_SHA256));
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = load_certs(Path::new("/nonexistent/proxy.pem")).unwrap_err();
        assert!(err.to_string().contains("Failed to open certificate file"));
    }

    #[test]
    fn test_empty_certificate_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not a pem file").unwrap();
        let err = load_certs(file.path()).unwrap_err();
        assert!(err.to_string().contains("No certificates found"));
    }

    #[test]
    fn test_missing_private_key() {
        let file = NamedTempFile::new().unwrap();
        let err = load_private_key(file.path()).unwrap_err();
        assert!(err.to_string().contains("No private key found"));
    }

    #[test]
    fn test_acceptor_from_leaf_certificate() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let certs = load_certs(&fixtures.join("leaf.pem")).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(create_mitm_acceptor(&fixtures.join("leaf.pem"), &fixtures.join("leaf.key")).is_ok());
    }

    #[test]
    fn test_acceptor_requires_valid_material() {
        let empty = NamedTempFile::new().unwrap();
        assert!(create_mitm_acceptor(empty.path(), empty.path()).is_err());
    }
}
