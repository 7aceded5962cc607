//! The trust decision engine.
//!
//! One evaluation per connection attempt: the configured mode selects a CA
//! path, a fallback path (TOFU or whitelist), both, or neither, and the engine
//! returns exactly one verdict. The engine holds no per-connection state; the
//! shared known-servers store is the only mutable resource.

use std::collections::HashMap;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TlsConfig;

use super::chain::ChainValidator;
use super::error::TrustError;
use super::fingerprint::{Fingerprint, PeerId};
use super::mode::TrustMode;
use super::store::{KnownServersStore, RecordOutcome};

/// Result of one trust evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The peer is trusted; nothing was recorded.
    Accepted,
    /// The peer is trusted and a first-use fingerprint was durably recorded.
    AcceptedAndRecorded,
    /// The connection attempt must be aborted.
    Rejected(RejectReason),
}

impl Verdict {
    /// Whether the connection may proceed.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Why an evaluation rejected the peer. Every variant carries the peer
/// identity so an operator can diagnose and consciously re-trust.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The CA path could not be built or verified and no fallback applies.
    #[error("chain validation failed for {peer}: {detail}")]
    ChainValidationFailed {
        /// Peer being evaluated.
        peer: PeerId,
        /// Validator diagnostic.
        detail: String,
    },
    /// The presented certificate disagrees with the recorded or whitelisted
    /// fingerprint. Never auto-healed.
    #[error("fingerprint mismatch for {peer}: expected {expected}, presented {presented}")]
    FingerprintMismatch {
        /// Peer being evaluated.
        peer: PeerId,
        /// Fingerprint on record.
        expected: Fingerprint,
        /// Fingerprint of the presented leaf certificate.
        presented: Fingerprint,
    },
    /// The known-servers store could not be read or durably written. An
    /// unpersisted acceptance would not survive a restart, so this fails
    /// closed.
    #[error("known-servers store unavailable while evaluating {peer}: {detail}")]
    StoreUnavailable {
        /// Peer being evaluated.
        peer: PeerId,
        /// Underlying store error.
        detail: String,
    },
    /// The configured mode leaves no way to verify this certificate.
    #[error("no trust path for {peer} under the configured mode")]
    NoTrustPath {
        /// Peer being evaluated.
        peer: PeerId,
    },
}

/// Decision point invoked once per connection attempt.
///
/// Stateless across calls apart from the shared [`KnownServersStore`]; safe to
/// share between concurrently evaluating connections.
#[derive(Debug)]
pub struct TrustEngine {
    mode: TrustMode,
    chain: Option<ChainValidator>,
    store: Option<Arc<KnownServersStore>>,
    whitelist: HashMap<PeerId, Fingerprint>,
}

impl TrustEngine {
    /// Build an engine from the TLS configuration, failing fast on an
    /// unrecognized mode, unreadable trust anchors or a corrupt store.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TrustError> {
        let mode: TrustMode = config.client_trust.parse()?;

        let chain = if mode.uses_ca() {
            Some(ChainValidator::new(&config.ca_certificates)?)
        } else {
            None
        };
        let store = if mode.uses_tofu() {
            Some(Arc::new(KnownServersStore::open(&config.known_servers)?))
        } else {
            None
        };
        // Whitelist modes read the known-servers file once and never write it.
        let whitelist = if mode.uses_whitelist() {
            KnownServersStore::open(&config.known_servers)?.snapshot()
        } else {
            HashMap::new()
        };

        if mode == TrustMode::Insecure {
            warn!("transport trust mode is INSECURE: all peer certificates will be accepted");
        } else {
            info!(%mode, "transport trust engine ready");
        }
        Ok(Self {
            mode,
            chain,
            store,
            whitelist,
        })
    }

    /// Active trust mode.
    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    /// Shared fingerprint store, when the mode records first-use peers.
    pub fn store(&self) -> Option<&Arc<KnownServersStore>> {
        self.store.as_ref()
    }

    /// Evaluate one connection attempt. `chain` is leaf-first, as negotiated
    /// by the transport; no network I/O happens here.
    pub fn evaluate(&self, peer: &PeerId, chain: &[CertificateDer<'_>]) -> Verdict {
        if self.mode == TrustMode::Insecure {
            warn!(%peer, "insecure trust mode: accepting certificate without verification");
            return Verdict::Accepted;
        }

        let Some(leaf) = chain.first() else {
            return Verdict::Rejected(RejectReason::ChainValidationFailed {
                peer: peer.clone(),
                detail: "peer presented an empty certificate chain".to_string(),
            });
        };
        let presented = Fingerprint::of_der(leaf.as_ref());

        if let Some(validator) = &self.chain {
            match validator.validate(peer.host(), chain) {
                Ok(()) => {
                    // CA success: the fingerprint store is neither consulted
                    // nor mutated.
                    debug!(%peer, "certificate chain validated against CA roots");
                    return Verdict::Accepted;
                }
                Err(err) if self.mode == TrustMode::Ca => {
                    return Verdict::Rejected(RejectReason::ChainValidationFailed {
                        peer: peer.clone(),
                        detail: err.to_string(),
                    });
                }
                Err(err) => {
                    debug!(%peer, error = %err, "chain validation failed, trying fallback path");
                }
            }
        }

        if let Some(store) = &self.store {
            return self.evaluate_tofu(store, peer, presented);
        }
        if self.mode.uses_whitelist() {
            return self.evaluate_whitelist(peer, presented);
        }
        Verdict::Rejected(RejectReason::NoTrustPath { peer: peer.clone() })
    }

    fn evaluate_tofu(
        &self,
        store: &KnownServersStore,
        peer: &PeerId,
        presented: Fingerprint,
    ) -> Verdict {
        match store.lookup(peer) {
            Some(expected) if expected == presented => {
                debug!(%peer, "presented certificate matches recorded fingerprint");
                Verdict::Accepted
            }
            Some(expected) => {
                warn!(%peer, %expected, %presented, "recorded fingerprint does not match presented certificate");
                Verdict::Rejected(RejectReason::FingerprintMismatch {
                    peer: peer.clone(),
                    expected,
                    presented,
                })
            }
            None => match store.record_if_absent(peer, presented) {
                Ok(RecordOutcome::Inserted) => Verdict::AcceptedAndRecorded,
                // Lost a first-use race; accept only if the winner saw the
                // same certificate.
                Ok(RecordOutcome::Existing(winner)) if winner == presented => Verdict::Accepted,
                Ok(RecordOutcome::Existing(winner)) => {
                    warn!(%peer, expected = %winner, %presented, "concurrent first-use with a different certificate");
                    Verdict::Rejected(RejectReason::FingerprintMismatch {
                        peer: peer.clone(),
                        expected: winner,
                        presented,
                    })
                }
                Err(err) => {
                    warn!(%peer, error = %err, "store unavailable, failing closed");
                    Verdict::Rejected(RejectReason::StoreUnavailable {
                        peer: peer.clone(),
                        detail: err.to_string(),
                    })
                }
            },
        }
    }

    fn evaluate_whitelist(&self, peer: &PeerId, presented: Fingerprint) -> Verdict {
        match self.whitelist.get(peer) {
            Some(expected) if *expected == presented => Verdict::Accepted,
            Some(expected) => Verdict::Rejected(RejectReason::FingerprintMismatch {
                peer: peer.clone(),
                expected: *expected,
                presented,
            }),
            // Unlisted peers have no verification strategy in whitelist modes.
            None => Verdict::Rejected(RejectReason::NoTrustPath { peer: peer.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rcgen::{CertificateParams, KeyPair};

    use super::*;

    fn self_signed(host: &str) -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        CertificateParams::new(vec![host.to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap()
            .der()
            .clone()
    }

    fn config(dir: &tempfile::TempDir, mode: &str) -> TlsConfig {
        TlsConfig {
            client_trust: mode.to_string(),
            known_servers: dir.path().join("known-servers.txt"),
            ..TlsConfig::default()
        }
    }

    #[test]
    fn insecure_accepts_anything() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TrustEngine::from_config(&config(&dir, "insecure")).unwrap();
        let verdict = engine.evaluate(&PeerId::new("localhost", 1), &[self_signed("localhost")]);
        assert_eq!(verdict, Verdict::Accepted);
    }

    #[test]
    fn empty_chain_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TrustEngine::from_config(&config(&dir, "tofu")).unwrap();
        let verdict = engine.evaluate(&PeerId::new("localhost", 1), &[]);
        assert!(matches!(
            verdict,
            Verdict::Rejected(RejectReason::ChainValidationFailed { .. })
        ));
    }

    #[test]
    fn unknown_mode_fails_at_build_time() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrustEngine::from_config(&config(&dir, "paranoid")).unwrap_err();
        assert!(matches!(err, TrustError::Configuration(_)));
    }

    #[test]
    fn corrupt_store_fails_at_build_time() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir, "tofu");
        std::fs::write(&cfg.known_servers, "not an entry\n").unwrap();
        assert!(matches!(
            TrustEngine::from_config(&cfg),
            Err(TrustError::CorruptStore { .. })
        ));
    }

    #[test]
    fn whitelist_never_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir, "whitelist");
        let listed = self_signed("listed.example");
        let listed_fp = Fingerprint::of_der(listed.as_ref());
        let contents = format!("listed.example:9001 {listed_fp}\n");
        std::fs::write(&cfg.known_servers, &contents).unwrap();
        let engine = TrustEngine::from_config(&cfg).unwrap();

        let verdict = engine.evaluate(&PeerId::new("listed.example", 9001), &[listed]);
        assert_eq!(verdict, Verdict::Accepted);

        let verdict = engine.evaluate(
            &PeerId::new("unlisted.example", 9001),
            &[self_signed("unlisted.example")],
        );
        assert!(matches!(
            verdict,
            Verdict::Rejected(RejectReason::NoTrustPath { .. })
        ));

        let verdict = engine.evaluate(
            &PeerId::new("listed.example", 9001),
            &[self_signed("listed.example")],
        );
        assert!(matches!(
            verdict,
            Verdict::Rejected(RejectReason::FingerprintMismatch { .. })
        ));

        // The file is a whitelist here, never a TOFU store.
        assert_eq!(std::fs::read_to_string(&cfg.known_servers).unwrap(), contents);
    }
}
