//! Router, rate limit middleware and the portal's rate-limited routes.
//!
//! Route handlers here stand in for the portal's real ones; they only exist
//! so that the middleware has something to short-circuit.

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{AkhbarnaError, Result};
use crate::ratelimit::presets::{ADMIN, API, AUTH, CONTACT, NEWSLETTER, SEARCH};
use crate::ratelimit::{
    KeyStrategy, PolicyTable, RateLimitBackend, RateLimitDecision, RateLimiter, RequestContext,
};

/// Shared state for the router.
#[derive(Clone)]
pub struct AppState {
    /// Shared rate limit store
    backend: Arc<dyn RateLimitBackend>,
    /// Policies available to routes
    policies: Arc<PolicyTable>,
}

impl AppState {
    /// Create router state over a store and a policy table.
    pub fn new(backend: Arc<dyn RateLimitBackend>, policies: PolicyTable) -> Self {
        Self {
            backend,
            policies: Arc::new(policies),
        }
    }

    /// Get the policy table.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Build a limiter for a named policy.
    pub fn limiter(&self, name: &str) -> Option<RateLimiter> {
        self.policies
            .get(name)
            .map(|policy| RateLimiter::new(self.backend.clone(), policy.clone()))
    }

    fn require_limiter(&self, name: &str) -> Result<Arc<RateLimiter>> {
        self.limiter(name)
            .map(Arc::new)
            .ok_or_else(|| AkhbarnaError::Config(format!("unknown rate limit policy '{}'", name)))
    }
}

/// Build the HTTP router.
///
/// Fails if a route refers to a policy missing from the table.
pub fn router(state: AppState) -> Result<Router> {
    let limited = |route: MethodRouter<AppState>, policy: &str| -> Result<MethodRouter<AppState>> {
        let limiter = state.require_limiter(policy)?;
        Ok(route.layer(from_fn_with_state(limiter, enforce_rate_limit)))
    };

    let routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", limited(post(acknowledge), AUTH)?)
        .route("/api/auth/register", limited(post(acknowledge), AUTH)?)
        .route("/api/contact", limited(post(acknowledge), CONTACT)?)
        .route("/api/newsletter/subscribe", limited(post(acknowledge), NEWSLETTER)?)
        .route("/api/search", limited(get(acknowledge), SEARCH)?)
        .route("/api/articles", limited(get(acknowledge), API)?)
        .route(
            "/api/admin/articles/{id}/moderate",
            limited(post(acknowledge), ADMIN)?,
        )
        .route("/api/rate-limit/{policy}", get(rate_limit_status));

    Ok(routes.with_state(state))
}

/// Middleware that admits or rejects a request under one policy.
///
/// A rejected request never reaches the inner handler.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = limiter.key_for(&RequestContext::new(req.headers(), req.uri().path()));
    let decision = limiter.check_key(&key).await;

    if let Some(body) = limiter.rejection(&decision) {
        warn!(
            policy = %limiter.policy().name,
            key = %key,
            retry_after = body.retry_after,
            "Rejecting rate limited request"
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Attach the decision's rate limit headers to a response.
pub fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn acknowledge() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Query for the status endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Path to evaluate endpoint-scoped policies against. Required for
    /// policies keyed by IP and endpoint.
    pub path: Option<String>,
}

/// Body of the status endpoint.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub policy: String,
    #[serde(flatten)]
    pub decision: RateLimitDecision,
}

async fn rate_limit_status(
    State(state): State<AppState>,
    Path(policy): Path<String>,
    Query(query): Query<StatusQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(limiter) = state.limiter(&policy) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Unknown rate limit policy", "policy": policy })),
        )
            .into_response();
    };

    let path = match (limiter.policy().key_strategy, query.path.as_deref()) {
        (_, Some(path)) => path,
        (KeyStrategy::IpEndpoint, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Missing path",
                    "message": "Policies keyed by endpoint need a `path` query parameter",
                    "policy": policy,
                })),
            )
                .into_response();
        }
        // Not part of the key.
        (_, None) => "",
    };
    let decision = limiter.status(&RequestContext::new(&headers, path)).await;

    let mut response = Json(StatusResponse { policy, decision }).into_response();
    apply_headers(response.headers_mut(), &decision);
    response
}
