//! Dial a freshly started local node with `ca-or-tofu` trust and watch the
//! known-servers store fill in.
//!
//! ```bash
//! cargo run --example tofu_connect
//! ```

use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use veilnode::config::TlsConfig;
use veilnode::transport::{Endpoint, NodeTransport, TransportConfig};
use veilnode::trust::TrustEngine;
use veilnode::NodeCredential;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let workdir = tempfile::tempdir()?;
    let transport_config = TransportConfig {
        bind_address: IpAddr::V6(Ipv6Addr::LOCALHOST),
        port: 0,
        ..TransportConfig::default()
    };

    // A peer node presenting a self-signed certificate, echoing one stream.
    let server_cred = NodeCredential::self_signed("localhost")?;
    println!("peer certificate fingerprint: {}", server_cred.fingerprint());
    let server_engine = Arc::new(TrustEngine::from_config(&TlsConfig {
        client_trust: "insecure".to_string(),
        known_servers: workdir.path().join("peer-known-servers.txt"),
        ..TlsConfig::default()
    })?);
    let server = Arc::new(NodeTransport::bind(
        transport_config.clone(),
        &server_cred,
        server_engine,
    )?);
    let port = server.local_addr()?.port();
    let accept = server.clone();
    tokio::spawn(async move {
        if let Ok(connection) = accept.accept().await {
            if let Ok(mut stream) = connection.accept_stream().await {
                if let Ok(data) = stream.recv_to_end(64 * 1024).await {
                    let _ = stream.send(data).await;
                    let _ = stream.finish();
                }
            }
        }
    });

    // Our node, dialing with CA-or-TOFU trust and an initially commented store.
    let store_path = workdir.path().join("known-servers.txt");
    std::fs::write(&store_path, "#First line\n")?;
    let tls = TlsConfig {
        client_trust: "ca-or-tofu".to_string(),
        known_servers: store_path.clone(),
        ..TlsConfig::default()
    };
    let engine = Arc::new(TrustEngine::from_config(&tls)?);
    let client_cred = NodeCredential::self_signed("localhost")?;
    let client = NodeTransport::bind(transport_config, &client_cred, engine)?;

    let connection = client.connect(&Endpoint::new("::1", port)).await?;
    let mut stream = connection.open_stream().await?;
    stream.send(Bytes::from_static(b"hello ledger")).await?;
    stream.finish()?;
    let echoed = stream.recv_to_end(64 * 1024).await?;
    println!("echoed: {}", String::from_utf8_lossy(&echoed));

    println!("known-servers store after first use:");
    print!("{}", std::fs::read_to_string(&store_path)?);
    Ok(())
}
