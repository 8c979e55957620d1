//! giftsync-relay binary entry point.
//!
//! Usage:
//! ```bash
//! giftsync-relay --config relay.toml
//! WEBSOCKET_PORT=5001 giftsync-relay
//! ```

use anyhow::Context;
use std::path::PathBuf;
use sync_relay::config::{Config, CONFIG_PATH_ENV};
use sync_relay::RelayServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = get_config_path();
    let config = Config::load(path.as_deref())
        .with_context(|| format!("loading configuration ({})", describe(path.as_deref())))?;

    tracing::info!(
        "giftsync-relay v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );
    let running = RelayServer::start(config)
        .await
        .context("starting relay")?;

    tokio::signal::ctrl_c()
        .await
        .context("installing ctrl-c handler")?;
    tracing::info!("shutdown requested");
    running.stop().await.context("stopping relay")?;
    Ok(())
}

/// `--config <path>`, else `RELAY_CONFIG`, else none (defaults + environment).
fn get_config_path() -> Option<PathBuf> {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from)
}

fn describe(path: Option<&std::path::Path>) -> String {
    path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string())
}
