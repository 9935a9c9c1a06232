pub mod config;
pub mod error;
pub mod media;
pub mod participant;
pub mod room;
pub mod signaling;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use config::ServerConfig;
use room::RoomRegistry;

/// Shared state handed to every signaling handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RoomRegistry::new()),
        }
    }
}

/// The signaling surface: a liveness probe at `/` and a WebSocket upgrade on
/// every other path, where the path names the room.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "pong" }))
        .route("/{*room}", get(signaling::ws_handler))
        .layer(cors)
        .with_state(state)
}
