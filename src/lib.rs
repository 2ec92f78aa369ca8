pub mod config;
pub mod error;
pub mod metrics;
pub mod ratelimit;
pub mod server;

use crate::config::AppConfig;
use crate::error::Result;
use crate::metrics::MetricsService;
use crate::ratelimit::RateLimiterService;
use crate::server::AppState;
use std::net::SocketAddr;
use tracing::info;

/// Initialize and run the admission-guarded service
pub async fn run_server(config: AppConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting apiguard");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    // Connect the rate limiter; a missing or dead shared store is not fatal
    let limiter = match &config.redis {
        Some(redis) => RateLimiterService::with_redis(&redis.store_config()).await,
        None => {
            info!("No shared store configured, rate limiting is process-local");
            RateLimiterService::local_only()
        }
    };
    limiter.log_backend();

    // Build the policy table
    let policies = config.rate_limits.policy_table();
    info!("Loaded {} endpoint class policies", policies.len());

    // Install metrics and assemble the router
    let metrics = MetricsService::new()?;
    let state = AppState::new(limiter, policies, metrics);
    let app = server::build_router(state);

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(crate::error::GuardError::Io)?;

    info!("apiguard ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::GuardError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apiguard=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
