//! Node configuration.
//!
//! Configuration is resolved once at startup. Trust-mode identifiers are
//! carried here as plain strings and parsed by the engine builder, which
//! fails fast on anything unrecognized.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use crate::transport::TransportConfig;

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Transport layer configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Transport trust configuration.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl NodeConfig {
    /// Load configuration from a YAML (or JSON) file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let parse_context = || format!("cannot parse config file {}", path.display());
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&text).with_context(parse_context)?,
            _ => serde_yaml::from_str(&text).with_context(parse_context)?,
        };
        Ok(config)
    }
}

/// TLS trust settings for outbound node connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Trust mode identifier: `ca`, `tofu`, `ca-or-tofu`, `whitelist`,
    /// `ca-or-whitelist` or `insecure`.
    pub client_trust: String,
    /// Path of the known-servers fingerprint store. Whitelist modes read the
    /// same file as a fixed mapping.
    pub known_servers: PathBuf,
    /// Operator-supplied CA certificates (PEM), added to the bundled trust
    /// anchors for chain validation.
    #[serde(default)]
    pub ca_certificates: Vec<PathBuf>,
    /// Client certificate chain (PEM) presented for mutual TLS.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// Private key (PEM) for `client_cert`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            client_trust: "ca-or-tofu".to_string(),
            known_servers: PathBuf::from("known-servers.txt"),
            ca_certificates: Vec::new(),
            client_cert: None,
            client_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = NodeConfig::default();
        assert_eq!(config.tls.client_trust, "ca-or-tofu");
        assert_eq!(config.tls.known_servers, PathBuf::from("known-servers.txt"));
        assert!(config.tls.ca_certificates.is_empty());
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yaml");
        std::fs::write(
            &path,
            "tls:\n  client_trust: tofu\n  known_servers: /var/lib/veilnode/known-servers.txt\n",
        )
        .unwrap();
        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.tls.client_trust, "tofu");
        assert_eq!(
            config.tls.known_servers,
            PathBuf::from("/var/lib/veilnode/known-servers.txt")
        );
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"tls": {"client_trust": "ca", "known_servers": "ks.txt"}}"#)
            .unwrap();
        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.tls.client_trust, "ca");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(NodeConfig::from_file("/nonexistent/node.yaml").is_err());
    }
}
