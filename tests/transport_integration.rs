//! Trust-gated QUIC connections between two in-process nodes.

use std::fs;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tempfile::TempDir;
use veilnode::config::TlsConfig;
use veilnode::transport::{Endpoint, NodeTransport, TransportConfig};
use veilnode::trust::{Fingerprint, TrustEngine};
use veilnode::NodeCredential;

fn loopback_config() -> TransportConfig {
    TransportConfig {
        bind_address: IpAddr::V6(Ipv6Addr::LOCALHOST),
        port: 0,
        connection_timeout: Duration::from_secs(5),
        max_idle_timeout: Duration::from_secs(30),
    }
}

fn tofu_engine(dir: &TempDir) -> Result<Arc<TrustEngine>> {
    let config = TlsConfig {
        client_trust: "ca-or-tofu".to_string(),
        known_servers: dir.path().join("known-servers.txt"),
        ..TlsConfig::default()
    };
    Ok(Arc::new(TrustEngine::from_config(&config)?))
}

fn insecure_engine(dir: &TempDir) -> Result<Arc<TrustEngine>> {
    let config = TlsConfig {
        client_trust: "insecure".to_string(),
        known_servers: dir.path().join("unused.txt"),
        ..TlsConfig::default()
    };
    Ok(Arc::new(TrustEngine::from_config(&config)?))
}

/// Spawn a one-shot echo node and return its transport.
fn echo_node(dir: &TempDir) -> Result<(Arc<NodeTransport>, u16, Fingerprint)> {
    let credential = NodeCredential::self_signed("localhost")?;
    let fingerprint = credential.fingerprint();
    let server = Arc::new(NodeTransport::bind(
        loopback_config(),
        &credential,
        insecure_engine(dir)?,
    )?);
    let port = server.local_addr()?.port();

    let accept = server.clone();
    tokio::spawn(async move {
        while let Ok(connection) = accept.accept().await {
            tokio::spawn(async move {
                if let Ok(mut stream) = connection.accept_stream().await {
                    if let Ok(data) = stream.recv_to_end(64 * 1024).await {
                        let _ = stream.send(data).await;
                        let _ = stream.finish();
                    }
                }
            });
        }
    });
    Ok((server, port, fingerprint))
}

#[tokio::test]
async fn first_use_connection_records_the_server_fingerprint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_server, port, server_fingerprint) = echo_node(&dir)?;

    let client_cred = NodeCredential::self_signed("localhost")?;
    let engine = tofu_engine(&dir)?;
    let client = NodeTransport::bind(loopback_config(), &client_cred, engine.clone())?;

    let connection = client.connect(&Endpoint::new("::1", port)).await?;
    let mut stream = connection.open_stream().await?;
    stream.send(Bytes::from_static(b"partyinfo")).await?;
    stream.finish()?;
    let echoed = stream.recv_to_end(64 * 1024).await?;
    assert_eq!(echoed.as_ref(), b"partyinfo");

    let store = engine.store().expect("tofu mode has a store");
    let peer = Endpoint::new("::1", port).peer_id();
    assert_eq!(store.lookup(&peer), Some(server_fingerprint));

    let text = fs::read_to_string(store.path())?;
    assert_eq!(text, format!("::1:{port} {server_fingerprint}\n"));
    Ok(())
}

#[tokio::test]
async fn reconnecting_to_a_known_peer_still_succeeds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_server, port, _) = echo_node(&dir)?;

    let client_cred = NodeCredential::self_signed("localhost")?;
    let engine = tofu_engine(&dir)?;
    let client = NodeTransport::bind(loopback_config(), &client_cred, engine.clone())?;

    let first = client.connect(&Endpoint::new("::1", port)).await?;
    first.close();
    let lines_after_first = fs::read_to_string(engine.store().unwrap().path())?;

    // A fresh transport forces a new handshake against the recorded entry.
    let client2 = NodeTransport::bind(loopback_config(), &client_cred, engine.clone())?;
    client2.connect(&Endpoint::new("::1", port)).await?;
    assert_eq!(
        fs::read_to_string(engine.store().unwrap().path())?,
        lines_after_first
    );
    Ok(())
}

#[tokio::test]
async fn mismatched_recorded_fingerprint_aborts_the_handshake() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_server, port, _) = echo_node(&dir)?;

    // Pre-record a different certificate for this identity.
    let rogue = NodeCredential::self_signed("localhost")?;
    let store_path = dir.path().join("known-servers.txt");
    fs::write(&store_path, format!("::1:{port} {}\n", rogue.fingerprint()))?;

    let client_cred = NodeCredential::self_signed("localhost")?;
    let engine = tofu_engine(&dir)?;
    let client = NodeTransport::bind(loopback_config(), &client_cred, engine)?;

    let result = client.connect(&Endpoint::new("::1", port)).await;
    assert!(result.is_err());

    // The recorded entry was not overwritten.
    assert_eq!(
        fs::read_to_string(&store_path)?,
        format!("::1:{port} {}\n", rogue.fingerprint())
    );
    Ok(())
}
