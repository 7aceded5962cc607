//! Node TLS credentials.
//!
//! A node presents one credential for inbound connections and, when mutual
//! TLS is configured, for outbound connections as well. Credentials are
//! loaded from PEM files in production; self-signed generation exists for
//! development and tests, which is exactly the population the TOFU fallback
//! serves.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::info;

use crate::trust::chain::load_pem_certs;
use crate::trust::Fingerprint;

/// The node's own TLS credential: certificate chain plus private key.
pub struct NodeCredential {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl NodeCredential {
    /// Load a PEM certificate chain and private key from disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let chain = load_pem_certs(cert_path)?;
        let key_data = std::fs::read(key_path)
            .with_context(|| format!("cannot read key file {}", key_path.display()))?;
        let key = rustls_pemfile::private_key(&mut key_data.as_slice())
            .with_context(|| format!("cannot parse key file {}", key_path.display()))?
            .ok_or_else(|| anyhow!("no private key found in {}", key_path.display()))?;
        let credential = Self { chain, key };
        info!(
            cert = %cert_path.display(),
            fingerprint = %credential.fingerprint(),
            "node credential loaded"
        );
        Ok(credential)
    }

    /// Generate a self-signed credential for `common_name`.
    pub fn self_signed(common_name: &str) -> Result<Self> {
        let cert_key = generate_simple_self_signed(vec![common_name.to_string()])?;
        let cert = cert_key.cert.der().clone();
        let key = PrivateKeyDer::try_from(cert_key.key_pair.serialize_der())
            .map_err(|err| anyhow!("cannot serialize private key: {err}"))?;
        let credential = Self {
            chain: vec![cert],
            key,
        };
        info!(
            common_name,
            fingerprint = %credential.fingerprint(),
            "self-signed node credential generated"
        );
        Ok(credential)
    }

    /// SHA-256 fingerprint of the leaf certificate, as peers will record it.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_der(self.chain[0].as_ref())
    }

    /// Leaf certificate.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    /// Owned copy of the certificate chain.
    pub fn chain(&self) -> Vec<CertificateDer<'static>> {
        self.chain.clone()
    }

    /// Owned copy of the private key.
    pub fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    /// rustls server configuration presenting this credential.
    pub fn server_crypto_config(&self) -> Result<rustls::ServerConfig> {
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(self.chain(), self.key())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_credential_has_full_width_fingerprint() {
        let credential = NodeCredential::self_signed("localhost").unwrap();
        let rendered = credential.fingerprint().to_string();
        assert_eq!(rendered.len(), 64);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn pem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cert_key = generate_simple_self_signed(vec!["node.example".to_string()]).unwrap();
        let cert_path = dir.path().join("node.crt");
        let key_path = dir.path().join("node.key");
        std::fs::write(&cert_path, cert_key.cert.pem()).unwrap();
        std::fs::write(&key_path, cert_key.key_pair.serialize_pem()).unwrap();

        let credential = NodeCredential::from_pem_files(&cert_path, &key_path).unwrap();
        assert_eq!(
            credential.fingerprint(),
            Fingerprint::of_der(cert_key.cert.der().as_ref())
        );
    }

    #[test]
    fn server_config_builds() {
        let credential = NodeCredential::self_signed("localhost").unwrap();
        credential.server_crypto_config().unwrap();
    }
}
