//! Layered configuration: defaults, an optional `client.toml`, then
//! environment variables, in that order of increasing precedence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub control_plane_addr: String,
    pub database_url_client: String,
    pub stun_servers: Vec<String>,
    pub keys_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let keys_dir = directories::ProjectDirs::from("", "", "tether")
            .map(|dirs| dirs.data_dir().join("keys"))
            .unwrap_or_else(|| PathBuf::from("keys"));

        Self {
            server_url: "ws://127.0.0.1:9000/ws".to_string(),
            control_plane_addr: "127.0.0.1:8000".to_string(),
            database_url_client: "sqlite://tether-client.db".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
            ],
            keys_dir,
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let defaults = ClientConfig::default();
        let builder = config::Config::builder()
            .set_default("server_url", defaults.server_url)?
            .set_default("control_plane_addr", defaults.control_plane_addr)?
            .set_default("database_url_client", defaults.database_url_client)?
            .set_default("stun_servers", defaults.stun_servers)?
            .set_default("keys_dir", defaults.keys_dir.to_string_lossy().to_string())?
            .add_source(config::File::with_name("client").required(false));

        let mut cfg: ClientConfig = builder.build()?.try_deserialize()?;

        if let Ok(server_url) = std::env::var("SERVER_URL") {
            cfg.server_url = server_url;
        }
        if let Ok(database_url) = std::env::var("DATABASE_URL_CLIENT") {
            cfg.database_url_client = database_url;
        }

        Ok(cfg)
    }
}
