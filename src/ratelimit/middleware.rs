use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use super::key;
use super::policy::PolicyTable;
use super::service::RateLimiterService;
use super::types::{AdmissionResult, Policy};

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";
pub const GLOBAL_LIMIT_HEADER: &str = "X-RateLimit-Global-Limit";
pub const GLOBAL_REMAINING_HEADER: &str = "X-RateLimit-Global-Remaining";

/// Endpoint class the service-wide guard counts under
pub const GLOBAL_CLASS: &str = "global";

/// Paths the service-wide guard never counts. Liveness probes and the
/// metrics scrape must not disappear behind a traffic spike elsewhere.
const GLOBAL_BYPASS_PREFIXES: &[&str] = &["/health", "/metrics"];

/// State handed to a guard layer: the limiter, the policy table, and the
/// endpoint class the guarded routes belong to.
#[derive(Clone)]
pub struct GuardContext {
    pub limiter: Arc<RateLimiterService>,
    pub policies: Arc<PolicyTable>,
    pub class: &'static str,
}

impl GuardContext {
    /// Create a guard context for one endpoint class
    pub fn new(
        limiter: Arc<RateLimiterService>,
        policies: Arc<PolicyTable>,
        class: &'static str,
    ) -> Self {
        Self {
            limiter,
            policies,
            class,
        }
    }
}

/// Per-route admission guard.
///
/// Checks the caller against the policy of the route's endpoint class.
/// Admitted requests continue to the handler and the response gains the
/// rate limit headers; denied requests are answered here with a 429 and
/// never reach the handler.
pub async fn admission_guard(
    State(ctx): State<GuardContext>,
    request: Request,
    next: Next,
) -> Response {
    let now = epoch_seconds();
    let policy = ctx.policies.policy_for(ctx.class);
    let peer = peer_address(&request);
    let result = check_request(&ctx, request.headers(), peer, policy, now).await;

    if !result.allowed {
        return create_denial_response(policy, &result, ctx.class, now);
    }

    let response = next.run(request).await;
    add_rate_limit_headers(response, &result)
}

/// Service-wide admission guard.
///
/// One coarse policy over every route, checked before any per-route guard.
/// Infrastructure paths are bypassed entirely and never counted.
pub async fn global_guard(
    State(ctx): State<GuardContext>,
    request: Request,
    next: Next,
) -> Response {
    if is_bypassed(request.uri().path()) {
        return next.run(request).await;
    }

    let now = epoch_seconds();
    let policy = ctx.policies.global();
    let peer = peer_address(&request);
    let result = check_request(&ctx, request.headers(), peer, policy, now).await;

    if !result.allowed {
        return create_global_denial_response(&result, now);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(GLOBAL_LIMIT_HEADER, HeaderValue::from(result.limit));
    headers.insert(GLOBAL_REMAINING_HEADER, HeaderValue::from(result.remaining));
    response
}

/// Resolve the caller, derive the key, and run one admission check.
///
/// Takes the request's headers and peer address rather than the request
/// itself so the guard futures stay `Send` (`Request<Body>` is not `Sync`
/// and must not be borrowed across the store await).
async fn check_request(
    ctx: &GuardContext,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    policy: Policy,
    now: u64,
) -> AdmissionResult {
    let address = key::client_address(headers, peer);
    let rate_key = key::derive_key(&address, ctx.class);

    let result = ctx.limiter.check(&rate_key, policy, now).await;
    crate::metrics::record_admission_check(ctx.class, result.allowed);

    if result.allowed {
        debug!(
            class = ctx.class,
            remaining = result.remaining,
            "admission check passed"
        );
    } else {
        warn!(
            event = "rate_limit_exceeded",
            class = ctx.class,
            key = %rate_key,
            limit = result.limit,
            current = result.current_count,
            "rate limit exceeded"
        );
    }
    result
}

fn peer_address(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0)
}

fn is_bypassed(path: &str) -> bool {
    GLOBAL_BYPASS_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Add rate limit headers to a response
pub fn add_rate_limit_headers(mut response: Response, result: &AdmissionResult) -> Response {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(result.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(result.reset_epoch_secs));
    response
}

/// Create a 429 response for an endpoint class denial
fn create_denial_response(
    policy: Policy,
    result: &AdmissionResult,
    class: &str,
    now: u64,
) -> Response {
    let retry_after = result.retry_after(now);
    let body = json!({
        "error": "Rate limit exceeded",
        "message": format!(
            "Too many requests. Limit: {} per {} seconds",
            policy.limit, policy.window_secs
        ),
        "retry_after": retry_after,
        "endpoint": class,
    });

    let response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let mut response = add_rate_limit_headers(response, result);
    response
        .headers_mut()
        .insert(RETRY_AFTER_HEADER, HeaderValue::from(retry_after));
    response
}

/// Create a 429 response for a service-wide denial
fn create_global_denial_response(result: &AdmissionResult, now: u64) -> Response {
    let retry_after = result.retry_after(now);
    let body = json!({
        "error": "Global rate limit exceeded",
        "message": "Too many requests from your IP address",
        "retry_after": retry_after,
    });

    let response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let mut response = add_rate_limit_headers(response, result);
    response
        .headers_mut()
        .insert(RETRY_AFTER_HEADER, HeaderValue::from(retry_after));
    response
}
