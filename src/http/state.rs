//! Shared handler state.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::config::{ExecutionConfig, PlatformConfig};
use crate::error::PlatformError;
use crate::execution::{
    ExecutionLogStore, ExecutionService, InMemoryAgentDirectory, InMemoryExecutionLogStore,
    MockLlmProvider, StaticTenantDirectory, TenantDirectory,
};
use crate::ratelimit::RateLimiter;

/// Header carrying the tenant's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub execution: Arc<ExecutionService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub logs: Arc<dyn ExecutionLogStore>,
    pub settings: Arc<ExecutionConfig>,
    pub service_name: Arc<str>,
}

impl AppState {
    /// Wire the in-memory directories, log store and mock provider around
    /// an already constructed rate limiter.
    pub fn from_config(config: &PlatformConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        let tenants: Arc<dyn TenantDirectory> = Arc::new(StaticTenantDirectory::new(&config.api_keys));
        let agents = Arc::new(InMemoryAgentDirectory::from_config(&config.agents));
        let logs: Arc<dyn ExecutionLogStore> = Arc::new(InMemoryExecutionLogStore::new());

        let execution = Arc::new(ExecutionService::new(
            rate_limiter.clone(),
            agents,
            logs.clone(),
            Arc::new(MockLlmProvider::new()),
            config.execution.clone(),
        ));

        Self {
            execution,
            rate_limiter,
            tenants,
            logs,
            settings: Arc::new(config.execution.clone()),
            service_name: Arc::from(config.server.service_name.as_str()),
        }
    }
}

/// The tenant authenticated by the request's API key.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for Tenant {
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| PlatformError::Authentication {
                code: "MISSING_API_KEY",
                message: "API key is required. Provide it in the X-API-KEY header".to_string(),
            })?;

        state.tenants.resolve(api_key).await.map(Tenant)
    }
}
