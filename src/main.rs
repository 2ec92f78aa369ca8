use anyhow::Context;
use apiguard::{config::AppConfig, init_tracing, run_server};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/apiguard.yaml".to_string());

    // Load configuration
    let config = AppConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    // Run the service
    run_server(config).await.context("server error")?;

    Ok(())
}
