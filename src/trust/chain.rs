//! CA chain validation.
//!
//! Path building, signature verification and validity checking are delegated
//! to rustls' webpki verifier; this module only assembles the trust-anchor set
//! and turns failures into diagnostics the operator can act on. Revocation is
//! not checked.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use thiserror::Error;
use tracing::debug;

use super::error::TrustError;

/// A failed chain validation, with enough detail to diagnose the peer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ChainError(String);

/// Validates certificate chains against the bundled Mozilla roots plus any
/// operator-supplied anchors.
#[derive(Debug)]
pub struct ChainValidator {
    verifier: Arc<WebPkiServerVerifier>,
}

impl ChainValidator {
    /// Build a validator over the bundled roots plus the PEM files in `anchors`.
    pub fn new(anchors: &[PathBuf]) -> Result<Self, TrustError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for path in anchors {
            for cert in load_pem_certs(path)? {
                roots.add(cert).map_err(|err| {
                    TrustError::Configuration(format!(
                        "invalid trust anchor in {}: {err}",
                        path.display()
                    ))
                })?;
            }
        }
        Self::with_roots(roots)
    }

    /// Build a validator over an explicit root store.
    pub fn with_roots(roots: RootCertStore) -> Result<Self, TrustError> {
        let verifier = WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::new(rustls::crypto::ring::default_provider()),
        )
        .build()
        .map_err(|err| TrustError::Configuration(format!("cannot build chain verifier: {err}")))?;
        Ok(Self { verifier })
    }

    /// Validate `chain` (leaf first) as a server certificate for `host`.
    pub fn validate(&self, host: &str, chain: &[CertificateDer<'_>]) -> Result<(), ChainError> {
        let (leaf, intermediates) = chain
            .split_first()
            .ok_or_else(|| ChainError("peer presented an empty certificate chain".to_string()))?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|err| ChainError(format!("invalid server name {host:?}: {err}")))?;
        match self
            .verifier
            .verify_server_cert(leaf, intermediates, &server_name, &[], UnixTime::now())
        {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(host, error = %err, "chain validation failed");
                Err(match subject_of(leaf) {
                    Some(subject) => ChainError(format!("{err} (peer certificate subject: {subject})")),
                    None => ChainError(err.to_string()),
                })
            }
        }
    }
}

/// Best-effort subject extraction for diagnostics.
fn subject_of(cert: &CertificateDer<'_>) -> Option<String> {
    x509_parser::parse_x509_certificate(cert.as_ref())
        .ok()
        .map(|(_, parsed)| parsed.subject().to_string())
}

/// Read all certificates from a PEM file.
pub(crate) fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TrustError> {
    let data = std::fs::read(path).map_err(|err| {
        TrustError::Configuration(format!("cannot read certificate file {}: {err}", path.display()))
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut data.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|err| {
            TrustError::Configuration(format!(
                "cannot parse certificate file {}: {err}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(TrustError::Configuration(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}
