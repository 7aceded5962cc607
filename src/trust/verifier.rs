//! rustls adapter for the trust engine.

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};

use super::engine::{TrustEngine, Verdict};
use super::fingerprint::PeerId;

/// Server-certificate verifier that delegates the trust decision to the
/// engine.
///
/// rustls hands a verifier only the server name, not the port, so one
/// verifier is built per connection attempt with the full `host:port`
/// identity captured at dial time. Signature verification stays with the
/// ring provider; only chain trust is customized.
pub struct NodeCertVerifier {
    engine: Arc<TrustEngine>,
    peer: PeerId,
    provider: Arc<CryptoProvider>,
}

impl NodeCertVerifier {
    /// Build a verifier for a single connection attempt to `peer`.
    pub fn for_peer(engine: Arc<TrustEngine>, peer: PeerId) -> Self {
        Self {
            engine,
            peer,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }
}

impl fmt::Debug for NodeCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCertVerifier")
            .field("peer", &self.peer)
            .field("mode", &self.engine.mode())
            .finish()
    }
}

impl ServerCertVerifier for NodeCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());

        match self.engine.evaluate(&self.peer, &chain) {
            Verdict::Accepted | Verdict::AcceptedAndRecorded => {
                Ok(ServerCertVerified::assertion())
            }
            Verdict::Rejected(reason) => Err(TlsError::General(reason.to_string())),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
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
    ) -> Result<HandshakeSignatureValid, TlsError> {
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
