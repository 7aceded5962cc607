//! QUIC transport for node-to-node connections.
//!
//! The transport owns the socket and the TLS wiring; every outbound dial goes
//! through the trust engine via a per-connection certificate verifier, so a
//! connection only completes once the engine has returned an accepting
//! verdict. Peer-directory exchange and request routing live above this
//! layer.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use serde::{Deserialize, Serialize};
use tokio::net::lookup_host;
use tracing::{debug, info};

pub mod certificates;

use crate::config::NodeConfig;
use crate::trust::{NodeCertVerifier, PeerId, TrustEngine};
use certificates::NodeCredential;

/// ALPN identifier spoken between veilnode peers.
pub const ALPN: &[u8] = b"veilnode/1";

/// Transport layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Local bind address.
    pub bind_address: IpAddr,
    /// Local port; 0 picks an ephemeral port.
    pub port: u16,
    /// Connection establishment timeout.
    pub connection_timeout: Duration,
    /// Maximum idle time before a connection is torn down.
    pub max_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: crate::DEFAULT_PORT,
            connection_timeout: Duration::from_secs(10),
            max_idle_timeout: Duration::from_secs(120),
        }
    }
}

/// A remote node endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address; used for resolution, SNI and the peer identity.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Peer identity used by the trust engine and the known-servers store.
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(&self.host, self.port)
    }
}

/// Bidirectional stream between nodes.
pub struct Stream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

impl Stream {
    /// Write `data` to the stream.
    pub async fn send(&mut self, data: Bytes) -> Result<()> {
        self.send.write_all(&data).await?;
        Ok(())
    }

    /// Signal that no more data will be sent.
    pub fn finish(&mut self) -> Result<()> {
        self.send.finish()?;
        Ok(())
    }

    /// Read until the peer finishes, up to `limit` bytes.
    pub async fn recv_to_end(&mut self, limit: usize) -> Result<Bytes> {
        let data = self.recv.read_to_end(limit).await?;
        Ok(Bytes::from(data))
    }
}

/// Established connection to a peer.
#[derive(Clone)]
pub struct Connection {
    inner: quinn::Connection,
    endpoint: Endpoint,
}

impl Connection {
    /// The remote endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Open a new bidirectional stream.
    pub async fn open_stream(&self) -> Result<Stream> {
        let (send, recv) = self.inner.open_bi().await?;
        Ok(Stream { send, recv })
    }

    /// Accept an incoming bidirectional stream.
    pub async fn accept_stream(&self) -> Result<Stream> {
        let (send, recv) = self.inner.accept_bi().await?;
        Ok(Stream { send, recv })
    }

    /// Whether the connection is still open.
    pub fn is_active(&self) -> bool {
        self.inner.close_reason().is_none()
    }

    /// Close the connection.
    pub fn close(&self) {
        self.inner.close(0u32.into(), b"closing");
    }
}

/// QUIC transport bound to a local socket, dialing peers through the trust
/// engine.
///
/// Construction and dialing must happen inside a tokio runtime.
pub struct NodeTransport {
    endpoint: quinn::Endpoint,
    config: TransportConfig,
    engine: Arc<TrustEngine>,
    client_credential: Option<Arc<NodeCredential>>,
    connections: DashMap<String, Connection>,
}

impl NodeTransport {
    /// Bind a transport serving `credential`, dialing through `engine`.
    pub fn bind(
        config: TransportConfig,
        credential: &NodeCredential,
        engine: Arc<TrustEngine>,
    ) -> Result<Self> {
        let mut server_crypto = credential.server_crypto_config()?;
        server_crypto.alpn_protocols = vec![ALPN.to_vec()];
        let mut server_config =
            quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(server_crypto)?));
        server_config.transport_config(Arc::new(quic_transport_config(&config)?));

        let addr = SocketAddr::new(config.bind_address, config.port);
        let endpoint = quinn::Endpoint::server(server_config, addr)
            .with_context(|| format!("cannot bind node transport to {addr}"))?;
        info!(addr = %endpoint.local_addr()?, "node transport bound");
        Ok(Self {
            endpoint,
            config,
            engine,
            client_credential: None,
            connections: DashMap::new(),
        })
    }

    /// Bind from a full node configuration, building the trust engine and the
    /// optional mutual-TLS client credential from its TLS section.
    pub fn from_node_config(config: &NodeConfig, credential: &NodeCredential) -> Result<Self> {
        let engine = Arc::new(TrustEngine::from_config(&config.tls)?);
        let mut transport = Self::bind(config.transport.clone(), credential, engine)?;
        if let (Some(cert), Some(key)) = (&config.tls.client_cert, &config.tls.client_key) {
            transport = transport
                .with_client_credential(Arc::new(NodeCredential::from_pem_files(cert, key)?));
        }
        Ok(transport)
    }

    /// Present `credential` as a client certificate on outbound connections.
    pub fn with_client_credential(mut self, credential: Arc<NodeCredential>) -> Self {
        self.client_credential = Some(credential);
        self
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// The trust engine gating outbound connections.
    pub fn engine(&self) -> &Arc<TrustEngine> {
        &self.engine
    }

    /// Dial `endpoint`. The handshake completes only if the trust engine
    /// accepts the peer's certificate chain.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<Connection> {
        let peer = endpoint.peer_id();
        if let Some(existing) = self.connections.get(&peer.to_string()) {
            if existing.is_active() {
                return Ok(existing.clone());
            }
        }

        let verifier = Arc::new(NodeCertVerifier::for_peer(self.engine.clone(), peer.clone()));
        let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier);
        let mut client_crypto = match &self.client_credential {
            Some(credential) => {
                builder.with_client_auth_cert(credential.chain(), credential.key())?
            }
            None => builder.with_no_client_auth(),
        };
        client_crypto.alpn_protocols = vec![ALPN.to_vec()];

        let mut client_config =
            quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(client_crypto)?));
        client_config.transport_config(Arc::new(quic_transport_config(&self.config)?));

        let addr = resolve(endpoint).await?;
        debug!(%peer, %addr, "dialing peer");
        let connecting = self
            .endpoint
            .connect_with(client_config, addr, &endpoint.host)?;
        let inner = tokio::time::timeout(self.config.connection_timeout, connecting)
            .await
            .map_err(|_| anyhow!("connection to {peer} timed out"))??;

        let connection = Connection {
            inner,
            endpoint: endpoint.clone(),
        };
        self.connections.insert(peer.to_string(), connection.clone());
        Ok(connection)
    }

    /// Accept the next inbound connection.
    pub async fn accept(&self) -> Result<Connection> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| anyhow!("node transport endpoint closed"))?;
        let inner = incoming.await?;
        let remote = inner.remote_address();
        debug!(%remote, "accepted inbound connection");
        Ok(Connection {
            inner,
            endpoint: Endpoint::new(remote.ip().to_string(), remote.port()),
        })
    }

    /// Close all connections and the local endpoint.
    pub fn shutdown(&self) {
        self.endpoint.close(0u32.into(), b"shutdown");
        self.connections.clear();
    }
}

fn quic_transport_config(config: &TransportConfig) -> Result<quinn::TransportConfig> {
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        config
            .max_idle_timeout
            .try_into()
            .map_err(|_| anyhow!("idle timeout out of range"))?,
    ));
    Ok(transport)
}

async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr> {
    lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .with_context(|| format!("cannot resolve {}:{}", endpoint.host, endpoint.port))?
        .next()
        .ok_or_else(|| anyhow!("no address for {}:{}", endpoint.host, endpoint.port))
}
