//! TLS client configuration for uploads.
//!
//! Provides `TlsVerification` for selecting how the server certificate is checked:
//! - `Disabled`: accept any certificate (self-signed and ad-hoc servers). Default.
//! - `WebPki`: Mozilla root store via `webpki-roots`.
//! - `CustomCa`: trust only the PEM certificates in a local file.
//!
//! With verification disabled the handshake signatures are still checked against
//! the presented certificate; only the chain of trust and the host name are skipped.

use anyhow::{anyhow, Context, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// How the server certificate is verified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Accept any server certificate.
    #[default]
    Disabled,

    /// Verify against the bundled Mozilla root store.
    WebPki,

    /// Verify against CA certificates read from a PEM file.
    CustomCa(PathBuf),
}

impl FromStr for TlsVerification {
    type Err = anyhow::Error;

    /// Parses the mode name only. `ca` needs a path and is built by the config layer.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "disabled" | "insecure" => Ok(Self::Disabled),
            "webpki" | "system" | "default" => Ok(Self::WebPki),
            "ca" => Err(anyhow!("TLS verification 'ca' requires a ca_path")),
            other => Err(anyhow!(
                "unknown TLS verification mode '{}': expected 'none', 'webpki' or 'ca'",
                other
            )),
        }
    }
}

impl std::fmt::Display for TlsVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "none"),
            Self::WebPki => write!(f, "webpki"),
            Self::CustomCa(path) => write!(f, "ca:{}", path.display()),
        }
    }
}

/// Build a rustls client configuration for the selected verification mode.
///
/// The provider is pinned to aws-lc-rs so the result does not depend on which
/// other rustls crypto features happen to be enabled in the build.
pub fn build_client_config(verification: &TlsVerification) -> Result<ClientConfig> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| anyhow!("failed to configure TLS versions: {}", e))?;

    let config = match verification {
        TlsVerification::Disabled => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new(provider)))
            .with_no_client_auth(),
        TlsVerification::WebPki => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsVerification::CustomCa(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read TLS CA '{}'", path.display()))?;
            builder
                .with_root_certificates(root_store_from_pem(&pem)?)
                .with_no_client_auth()
        }
    };
    Ok(config)
}

fn root_store_from_pem(pem: &[u8]) -> Result<RootCertStore> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("failed to parse CA certificate from PEM: {}", e))?;
    if certs.is_empty() {
        return Err(anyhow!("no CA certificates found in PEM data"));
    }
    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| anyhow!("failed to add CA certificate: {}", e))?;
    }
    Ok(roots)
}

/// Accepts every server certificate.
#[derive(Debug)]
struct NoCertificateVerification {
    provider: Arc<CryptoProvider>,
}

impl NoCertificateVerification {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_from_str() {
        assert_eq!(
            "none".parse::<TlsVerification>().unwrap(),
            TlsVerification::Disabled
        );
        assert_eq!(
            "INSECURE".parse::<TlsVerification>().unwrap(),
            TlsVerification::Disabled
        );
        assert_eq!(
            "webpki".parse::<TlsVerification>().unwrap(),
            TlsVerification::WebPki
        );
        assert!("ca".parse::<TlsVerification>().is_err());
        assert!("strict".parse::<TlsVerification>().is_err());
    }

    #[test]
    fn verification_display() {
        assert_eq!(TlsVerification::Disabled.to_string(), "none");
        assert_eq!(TlsVerification::WebPki.to_string(), "webpki");
        assert_eq!(
            TlsVerification::CustomCa(PathBuf::from("/etc/ca.pem")).to_string(),
            "ca:/etc/ca.pem"
        );
    }

    #[test]
    fn disabled_and_webpki_configs_build() {
        assert!(build_client_config(&TlsVerification::Disabled).is_ok());
        assert!(build_client_config(&TlsVerification::WebPki).is_ok());
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let err = build_client_config(&TlsVerification::CustomCa(PathBuf::from(
            "/nonexistent/ca.pem",
        )))
        .unwrap_err();
        assert!(err.to_string().contains("failed to read TLS CA"));
    }

    #[test]
    fn empty_pem_rejected() {
        let err = root_store_from_pem(b"not a certificate").unwrap_err();
        assert!(err.to_string().contains("no CA certificates"));
    }
}
