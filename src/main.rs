//! Pong Relay Server
//!
//! Binds both transports, spawns the fan-out hub, and runs until either
//! transport fails or the process is interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pong_relay::network::{api, hub};
use pong_relay::{RelayConfig, RelayContext, RelayServer, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env();
    info!("pong relay hub v{}", VERSION);

    let ctx = Arc::new(RelayContext::new(config.clone()));

    // The hub must be up before either transport can schedule broadcasts;
    // anything scheduled earlier would be dropped.
    let _hub = hub::spawn_hub(&ctx.bridge);

    let streaming = Arc::new(RelayServer::new(ctx.clone()));
    let streaming_task = {
        let server = streaming.clone();
        tokio::spawn(async move { server.run().await })
    };

    let router = api::build_router(ctx);
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .context("failed to bind request listener")?;
    info!("request listener on {}", config.http_addr);
    let http_task = tokio::spawn(async move { axum::serve(listener, router).await });

    tokio::select! {
        result = streaming_task => {
            result.context("streaming transport task panicked")??;
        }
        result = http_task => {
            result.context("request transport task panicked")?
                .context("request transport failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            streaming.shutdown();
        }
    }

    Ok(())
}
