use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::{info, Level};

use chorus_server::config::ServerConfig;
use chorus_server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = ServerConfig::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config));

    info!("signaling server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listen port")?;
    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
