//! Subcommand bodies. Each returns data; `main` decides how to print it.

use crate::config::NodeConfig;
use crate::error::NodeError;

use common::RedactedSecret;

use woof_core::client::WoofClient;
use woof_core::error::EndpointError;
use woof_core::proto::{ApiMessageType, IdentifyResponse};
use woof_core::server::{ConnectionObserver, WoofServer};
use woof_core::transport::ConnectionId;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

/// Logs connections as they come and go.
struct ConnectionLogger;

#[async_trait]
impl ConnectionObserver for ConnectionLogger {
    async fn on_connected(&self, connection: ConnectionId) -> Result<(), EndpointError> {
        info!("Client connected: {connection}");
        Ok(())
    }

    async fn on_disconnected(&self, connection: ConnectionId) -> Result<(), EndpointError> {
        info!("Client disconnected: {connection}");
        Ok(())
    }
}

/// Build and start a server from `config`, listening on `listen` if given.
pub async fn start_server(
    config: &NodeConfig,
    listen: Option<&str>,
) -> Result<(WoofServer, SocketAddr), NodeError> {
    let mut builder =
        WoofServer::builder(config.endpoint.clone(), Arc::new(config.auth_backend()));
    if let Some(provider) = config.stream_provider() {
        info!("Serving streams from {}", provider.root().display());
        builder = builder.stream_provider(Arc::new(provider));
    }

    let server = builder.build();
    server.add_connection_observer(Arc::new(ConnectionLogger));

    let address = listen.unwrap_or(config.listen_address.as_str());
    let local_addr = server.start(address).await?;
    Ok((server, local_addr))
}

/// Run a server until Ctrl-C, then stop it.
pub async fn serve(config: &NodeConfig, listen: Option<&str>) -> Result<(), NodeError> {
    let (server, local_addr) = start_server(config, listen).await?;
    info!(
        "woof-node {} serving on ws://{local_addr}",
        config.endpoint.identity.name
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| NodeError::node(format!("Failed to wait for Ctrl-C: {e}")))?;

    info!("Shutting down");
    server.stop().await?;
    Ok(())
}

pub async fn ping(config: &NodeConfig, url: &str, count: u32) -> Result<Vec<Duration>, NodeError> {
    let client = connect(config, url).await?;
    let mut round_trips = Vec::with_capacity(count as usize);
    let mut result = Ok(());
    for _ in 0..count {
        match client.ping().await {
            Ok(round_trip) => round_trips.push(round_trip),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    finish(client, result).await?;
    Ok(round_trips)
}

pub async fn identify(config: &NodeConfig, url: &str) -> Result<IdentifyResponse, NodeError> {
    let client = connect(config, url).await?;
    let result = client.identify().await;
    finish(client, result).await
}

pub async fn api(
    config: &NodeConfig,
    url: &str,
    include_internal: bool,
) -> Result<Vec<ApiMessageType>, NodeError> {
    let client = connect(config, url).await?;
    let result = client.query_api(!include_internal).await;
    finish(client, result).await
}

/// Download `stream_id` into `output`, signing in first when credentials are
/// given. A partial file is removed on failure.
pub async fn download(
    config: &NodeConfig,
    url: &str,
    stream_id: &str,
    output: &Path,
    credentials: Option<(String, RedactedSecret)>,
) -> Result<u64, NodeError> {
    let mut file = tokio::fs::File::create(output)
        .await
        .map_err(|e| NodeError::node(format!("Failed to create {}: {e}", output.display())))?;

    let client = match connect(config, url).await {
        Ok(client) => client,
        Err(e) => {
            discard(output).await;
            return Err(e);
        }
    };

    let signed_in = match credentials {
        Some((api_key, api_secret)) => client.sign_in(&api_key, api_secret).await.map(|_| ()),
        None => Ok(()),
    };
    let result = match signed_in {
        Ok(()) => client.download_stream_to(stream_id, &mut file).await,
        Err(e) => Err(e),
    };
    drop(file);

    match finish(client, result).await {
        Ok(bytes) => {
            info!("Wrote {bytes} bytes to {}", output.display());
            Ok(bytes)
        }
        Err(e) => {
            discard(output).await;
            Err(e)
        }
    }
}

async fn connect(config: &NodeConfig, url: &str) -> Result<WoofClient, NodeError> {
    let client = WoofClient::new(config.endpoint.clone());
    client.start(url).await?;
    Ok(client)
}

async fn finish<T>(client: WoofClient, result: Result<T, EndpointError>) -> Result<T, NodeError> {
    if let Err(e) = client.stop().await {
        warn!("Failed to stop client cleanly: {e}");
    }
    Ok(result?)
}

async fn discard(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        warn!("Failed to remove partial download {}: {e}", output.display());
    }
}
