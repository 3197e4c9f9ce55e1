pub mod queue;
pub mod server;
pub mod standalone;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use keeper_core::config::{Config, StoreConfig, WarnLevel};
use keeper_core::store::{BoxStore, MemoryStore, PgStore};
use tokio::net::TcpListener;

/// Flags every service command takes.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// PostgreSQL connection URL (in-memory store when unset)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address to listen on for API requests
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: String,

    /// Address to listen on for telemetry requests
    #[arg(long, env = "TELEMETRY_LISTEN_ADDRESS", default_value = "0.0.0.0:9090")]
    pub telemetry_listen_address: String,
}

impl ServiceArgs {
    pub async fn bind(&self) -> Result<(TcpListener, TcpListener)> {
        let api = TcpListener::bind(&self.listen_address)
            .await
            .with_context(|| format!("bind {}", self.listen_address))?;
        let telemetry = TcpListener::bind(&self.telemetry_listen_address)
            .await
            .with_context(|| format!("bind {}", self.telemetry_listen_address))?;
        Ok((api, telemetry))
    }
}

/// Load the tuning file, log its warnings and refuse unusable values.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("load configuration")?;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => tracing::error!("config: {}", warning.message),
            WarnLevel::Warning => tracing::warn!("config: {}", warning.message),
        }
    }
    config.ensure_valid()?;
    Ok(config)
}

/// Connect to PostgreSQL when a URL is given, otherwise keep boxes in memory.
pub async fn open_store(database_url: Option<&str>, config: &StoreConfig) -> Result<Arc<dyn BoxStore>> {
    match database_url.filter(|url| !url.is_empty()) {
        Some(url) => {
            let store = PgStore::connect(url, config)
                .await
                .context("connect to database")?;
            store.migrate().await.context("run database migrations")?;
            tracing::info!("connected to database");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no database configured, boxes are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
