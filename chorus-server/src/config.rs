use std::env;
use tracing::warn;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port for the signaling endpoint (`PORT` env, default 8080).
    pub port: u16,
    /// STUN servers handed to the media framework.
    pub ice_servers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ice_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("ignoring invalid PORT value {port:?}"),
            }
        }
        config
    }
}
