//! Route handlers for the gateway API.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::state::{AppState, Tenant};
use crate::error::{PlatformError, Result};
use crate::execution::{ExecutionRequest, HistoryPage};

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_WINDOW: &str = "x-ratelimit-window";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/agents/:agent_id/run", post(run_agent))
        .route("/rate-limit", get(rate_limit_status))
        .route("/history", get(history));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name.to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_agent(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(agent_id): Path<String>,
    body: std::result::Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Response> {
    let agent_id = Uuid::parse_str(&agent_id).map_err(|_| {
        PlatformError::validation(
            "agent_id must be a valid UUID",
            json!({ "field": "agent_id", "value": agent_id }),
        )
    })?;
    let Json(request) =
        body.map_err(|rejection| PlatformError::validation(rejection.body_text(), Value::Null))?;

    let (result, remaining) = state
        .execution
        .execute_agent(&tenant_id, &agent_id, &request)
        .await?;

    let mut response = Json(result).into_response();
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(state.rate_limiter.limit()));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(
        RATE_LIMIT_WINDOW,
        HeaderValue::from(state.rate_limiter.window_seconds()),
    );
    Ok(response)
}

#[derive(Debug, Serialize)]
struct RateLimitStatus {
    limit: u32,
    remaining: u32,
    window_seconds: u64,
}

/// Report the tenant's quota without consuming it.
async fn rate_limit_status(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
) -> Json<RateLimitStatus> {
    let remaining = state.rate_limiter.remaining_or_zero(&tenant_id).await;
    debug!(tenant_id = %tenant_id, remaining, "Rate limit status requested");

    Json(RateLimitStatus {
        limit: state.rate_limiter.limit(),
        remaining,
        window_seconds: state.rate_limiter.window_seconds(),
    })
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

async fn history(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryPage>> {
    let Query(params) = params.map_err(|rejection| PlatformError::Validation {
        code: "INVALID_PAGINATION",
        message: "Pagination parameters are invalid".to_string(),
        details: json!({ "reason": rejection.body_text() }),
    })?;

    let limit = params.limit.unwrap_or(state.settings.default_page_limit);
    if limit == 0 || limit > state.settings.max_page_limit {
        return Err(PlatformError::Validation {
            code: "INVALID_PAGINATION",
            message: "Pagination parameters are invalid".to_string(),
            details: json!({
                "limit": {
                    "provided": limit,
                    "max_allowed": state.settings.max_page_limit,
                }
            }),
        });
    }

    let page = state
        .logs
        .list_for_tenant(&tenant_id, limit, params.offset)
        .await?;
    Ok(Json(page))
}
