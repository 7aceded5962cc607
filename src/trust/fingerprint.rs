//! Certificate fingerprints and peer identities.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// SHA-256 digest of a DER-encoded certificate, the compact identity used for
/// all trust comparisons. Rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a DER-encoded certificate.
    pub fn of_der(cert_der: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(cert_der);
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

/// Error parsing a fingerprint from its hex rendering.
#[derive(Debug, Clone, Error)]
#[error("invalid fingerprint {0:?}: expected 64 hex characters")]
pub struct InvalidFingerprint(String);

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(InvalidFingerprint(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| InvalidFingerprint(s.to_string()))?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }
}

/// Identity of a peer endpoint, serialized canonically as `host:port`.
///
/// The host is lowercased on construction so the same peer always maps to the
/// same known-servers key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId {
    host: String,
    port: u16,
}

impl PeerId {
    /// Build a canonical identity for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.trim().to_ascii_lowercase(),
            port,
        }
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({}:{})", self.host, self.port)
    }
}

/// Error parsing a peer identity from its `host:port` rendering.
#[derive(Debug, Clone, Error)]
#[error("invalid peer identity {0:?}: expected host:port")]
pub struct InvalidPeerId(String);

impl FromStr for PeerId {
    type Err = InvalidPeerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| InvalidPeerId(s.to_string()))?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(InvalidPeerId(s.to_string()));
        }
        let port = port.parse().map_err(|_| InvalidPeerId(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
