mod config;
mod core;
mod db;
mod engine;
mod error;
mod leveling;
mod server;
mod state;
mod streak;
mod traits;
mod types;
pub mod utils;

#[cfg(test)]
mod integration_tests;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        config::AppConfig::load(&config_path)?
    } else {
        tracing::warn!(
            "No config at {}, starting with defaults",
            config_path.display()
        );
        config::AppConfig::default()
    };

    // Run async
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}
