//! HTTP surface of the service.
//!
//! Routes are grouped by endpoint class and each group carries its own
//! admission guard. The service-wide guard and request tracing wrap the
//! whole router. Handlers here are the service boundary: they answer
//! trivially so the guards have something real to protect.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::metrics::{metrics_handler, MetricsService};
use crate::ratelimit::key;
use crate::ratelimit::middleware::{admission_guard, global_guard, GuardContext, GLOBAL_CLASS};
use crate::ratelimit::{PolicyTable, RateLimiterService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiterService>,
    pub policies: Arc<PolicyTable>,
    pub metrics: MetricsService,
}

impl AppState {
    /// Create application state from the assembled services
    pub fn new(
        limiter: RateLimiterService,
        policies: PolicyTable,
        metrics: MetricsService,
    ) -> Self {
        Self {
            limiter: Arc::new(limiter),
            policies: Arc::new(policies),
            metrics,
        }
    }
}

/// Build the service router with every guard in place
pub fn build_router(state: AppState) -> Router {
    let class_guard = |class: &'static str| {
        middleware::from_fn_with_state(
            GuardContext::new(state.limiter.clone(), state.policies.clone(), class),
            admission_guard,
        )
    };

    let api = Router::new()
        .merge(
            Router::new()
                .route("/health", get(health))
                .route_layer(class_guard("health")),
        )
        .merge(
            Router::new()
                .route("/ask", post(ask))
                .route_layer(class_guard("ask")),
        )
        .merge(
            Router::new()
                .route("/execute", post(execute))
                .route_layer(class_guard("execute")),
        )
        .merge(
            Router::new()
                .route("/users", get(users))
                .route_layer(class_guard("users")),
        )
        .merge(
            Router::new()
                .route("/roadmaps", post(roadmaps))
                .route_layer(class_guard("roadmaps")),
        )
        .merge(
            Router::new()
                .route("/analytics", get(analytics))
                .route_layer(class_guard("analytics")),
        )
        .merge(
            Router::new()
                .route("/analytics/summary", get(analytics_summary))
                .route_layer(class_guard("analytics_summary")),
        )
        .route("/ratelimit/status", get(ratelimit_status))
        .route(
            "/metrics",
            get(metrics_handler).with_state(state.metrics.clone()),
        );

    let global = middleware::from_fn_with_state(
        GuardContext::new(state.limiter.clone(), state.policies.clone(), GLOBAL_CLASS),
        global_guard,
    );

    api.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(global),
    )
    .with_state(state)
}

/// Liveness probe. Bypassed by the service-wide guard; its own class
/// policy still applies.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

// Boundary handlers. A deployment mounts its real application logic on
// these routes; they answer just enough for the guards to be exercised
// end to end.

async fn ask() -> impl IntoResponse {
    Json(json!({ "endpoint": "ask", "status": "accepted" }))
}

async fn execute() -> impl IntoResponse {
    Json(json!({ "endpoint": "execute", "status": "accepted" }))
}

async fn users() -> impl IntoResponse {
    Json(json!({ "endpoint": "users", "users": [] }))
}

async fn roadmaps() -> impl IntoResponse {
    Json(json!({ "endpoint": "roadmaps", "status": "accepted" }))
}

async fn analytics() -> impl IntoResponse {
    Json(json!({ "endpoint": "analytics", "events": [] }))
}

async fn analytics_summary() -> impl IntoResponse {
    Json(json!({ "endpoint": "analytics_summary", "summary": {} }))
}

#[derive(Deserialize)]
struct StatusQuery {
    endpoint: Option<String>,
}

/// Inspection endpoint: reports which policy, key, and backend apply to
/// the calling address for a given endpoint class.
#[axum::debug_handler]
async fn ratelimit_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
    request: Request,
) -> impl IntoResponse {
    let class = query.endpoint.unwrap_or_else(|| "default".to_string());
    let policy = state.policies.policy_for(&class);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let address = key::client_address(request.headers(), peer);
    let rate_key = key::derive_key(&address, &class);

    Json(json!({
        "endpoint": class,
        "limit": policy.limit,
        "window_secs": policy.window_secs,
        "key": rate_key,
        "backend": state.limiter.backend_name(),
    }))
}
