use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod echo;
mod routes;

#[derive(Parser)]
#[command(name = "relay-gateway", about = "Websocket broadcast hub gateway")]
struct Cli {
    /// Path to relay.toml (falls back to RELAY_CONFIG, then ~/.relay/relay.toml)
    #[arg(long)]
    config: Option<String>,
    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_gateway=info,relay_hub=info,tower_http=debug".into()),
        )
        .init();

    let mut config = relay_core::RelayConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        relay_core::RelayConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let (hub, handle) = relay_hub::Hub::build(config.hub.command_cap, Arc::new(echo::EchoHandler));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(hub.run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, handle));
    let router = app::build_router(state);

    info!("relay gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            // drain the hub first: clearing the registry closes every
            // outbound queue, the write pumps send close frames, and the
            // live websocket sessions end so serve can finish
            let _ = shutdown_tx.send(true);
        })
        .await?;
    Ok(())
}
