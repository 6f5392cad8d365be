//! TLS configuration for the mock listener and the proxy client.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use tokio_rustls::TlsAcceptor;
use tracing::warn;

use crate::environment::TlsConfig;
use crate::server::error::ServerError;

/// Certificate verifier that accepts any upstream certificate.
#[derive(Debug)]
pub struct NoVerifier;

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
        default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client config for the proxy, pinned to the ring provider.
pub fn insecure_client_config() -> rustls::ClientConfig {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap_or_else(|_| rustls::ClientConfig::builder_with_protocol_versions(rustls::DEFAULT_VERSIONS));
    builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth()
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn open(base: &Path, path: Option<&str>, what: &str) -> Result<BufReader<File>, ServerError> {
    let path = path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServerError::CertFileNotFound(format!("no {what} file configured")))?;
    let resolved = resolve(base, path);
    match File::open(&resolved) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ServerError::CertFileNotFound(resolved.display().to_string()))
        }
        Err(e) => Err(ServerError::Tls(format!(
            "failed to open {what} file '{}': {e}",
            resolved.display()
        ))),
    }
}

fn read_certs(reader: &mut BufReader<File>, what: &str) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    rustls_pemfile::certs(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse {what} file: {e}")))
}

/// Build a TLS acceptor from the environment's certificate, key and
/// optional CA files. Relative paths resolve against `base_dir`.
pub fn create_tls_acceptor(tls: &TlsConfig, base_dir: &Path) -> Result<TlsAcceptor, ServerError> {
    if tls.passphrase.as_deref().is_some_and(|p| !p.is_empty()) {
        warn!("TLS key passphrases are not supported, the key must be unencrypted");
    }

    let mut cert_reader = open(base_dir, tls.cert_path.as_deref(), "certificate")?;
    let mut key_reader = open(base_dir, tls.key_path.as_deref(), "key")?;

    let mut certs = read_certs(&mut cert_reader, "certificate")?;
    if certs.is_empty() {
        return Err(ServerError::Tls("no certificates found in certificate file".into()));
    }

    if tls.ca_path.as_deref().is_some_and(|p| !p.is_empty()) {
        let mut ca_reader = open(base_dir, tls.ca_path.as_deref(), "CA")?;
        certs.extend(read_certs(&mut ca_reader, "CA")?);
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse key file: {e}")))?
        .ok_or_else(|| ServerError::Tls("no private key found in key file".into()))?;

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("failed to build TLS configuration: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
