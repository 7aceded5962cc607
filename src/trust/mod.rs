//! Transport trust for node-to-node connections.
//!
//! The operator population of the network is open, so peer certificates
//! cannot be validated against a CA hierarchy alone: many peers are
//! self-signed. This module implements the hybrid model: validate against
//! CA roots when possible, otherwise trust-on-first-use backed by a durable
//! known-servers store that rejects any peer later presenting a different
//! certificate under the same identity.
//!
//! [`TrustEngine::evaluate`] is the single decision point, invoked once per
//! connection attempt with the peer identity and the negotiated certificate
//! chain. [`NodeCertVerifier`] plugs that decision into a rustls handshake.

pub mod chain;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod mode;
pub mod store;
pub mod verifier;

pub use chain::ChainValidator;
pub use engine::{RejectReason, TrustEngine, Verdict};
pub use error::TrustError;
pub use fingerprint::{Fingerprint, PeerId};
pub use mode::TrustMode;
pub use store::{KnownServersStore, RecordOutcome};
pub use verifier::NodeCertVerifier;
