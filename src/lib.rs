//! veilnode - peer-to-peer node client for a distributed ledger privacy
//! network.
//!
//! Nodes exchange payloads over mutually authenticated QUIC, but the operator
//! population is open: many peers present self-signed certificates that no CA
//! hierarchy can vouch for. The crate therefore centres on a hybrid trust
//! model: validate against CA roots when possible, otherwise trust on first
//! use, remembering each peer's certificate fingerprint in a durable
//! known-servers store and rejecting any peer that later presents a different
//! certificate under the same identity.
//!
//! The decision point is [`trust::TrustEngine`]; [`transport::NodeTransport`]
//! wires it into real connections.

#![warn(missing_docs)]

pub mod config;
pub mod transport;
pub mod trust;

pub use config::{NodeConfig, TlsConfig};
pub use transport::certificates::NodeCredential;
pub use transport::{Connection, Endpoint, NodeTransport, Stream, TransportConfig};
pub use trust::{
    Fingerprint, KnownServersStore, PeerId, RejectReason, TrustEngine, TrustError, TrustMode,
    Verdict,
};

/// Default port for node-to-node connections.
pub const DEFAULT_PORT: u16 = 9494;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_default_port() {
        let config = NodeConfig::default();
        assert_eq!(config.transport.port, DEFAULT_PORT);
    }
}
