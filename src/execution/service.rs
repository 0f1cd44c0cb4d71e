//! Agent execution service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::directory::AgentDirectory;
use super::history::{ExecutionLogStore, NewExecutionLog};
use super::provider::LlmProvider;
use crate::config::ExecutionConfig;
use crate::error::{PlatformError, Result};
use crate::ratelimit::RateLimiter;

const MAX_TOKENS_CEILING: u32 = 4096;
const NO_TOOLS_WARNING: &str =
    "This agent has no tools configured. Consider adding tools for enhanced capabilities.";

fn default_temperature() -> f64 {
    0.7
}

/// Body of an execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The task prompt for the agent
    pub prompt: String,
    /// The model to use for execution
    pub model: String,
    /// Sampling temperature, 0.0 to 2.0
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Response token cap, 1 to 4096
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ExecutionRequest {
    /// Check the request against the configured execution settings.
    pub fn validate(&self, settings: &ExecutionConfig) -> Result<()> {
        let prompt_len = self.prompt.chars().count();
        if prompt_len == 0 || prompt_len > settings.max_prompt_length {
            return Err(PlatformError::validation(
                format!(
                    "prompt must be between 1 and {} characters",
                    settings.max_prompt_length
                ),
                json!({ "field": "prompt", "length": prompt_len }),
            ));
        }

        if !settings.allowed_models.iter().any(|m| m == &self.model) {
            return Err(PlatformError::Validation {
                code: "INVALID_MODEL",
                message: "The specified model is not supported".to_string(),
                details: json!({
                    "provided_model": self.model,
                    "allowed_models": settings.allowed_models,
                }),
            });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PlatformError::validation(
                "temperature must be between 0.0 and 2.0",
                json!({ "field": "temperature", "value": self.temperature }),
            ));
        }

        if let Some(max_tokens) = self.max_tokens {
            if max_tokens == 0 || max_tokens > MAX_TOKENS_CEILING {
                return Err(PlatformError::validation(
                    format!("max_tokens must be between 1 and {}", MAX_TOKENS_CEILING),
                    json!({ "field": "max_tokens", "value": max_tokens }),
                ));
            }
        }

        Ok(())
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResponse {
    pub execution_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub tools_available: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Runs agent prompts for tenants, charging each run against the tenant's
/// rate limit before any work is done.
pub struct ExecutionService {
    rate_limiter: Arc<RateLimiter>,
    agents: Arc<dyn AgentDirectory>,
    logs: Arc<dyn ExecutionLogStore>,
    provider: Arc<dyn LlmProvider>,
    settings: ExecutionConfig,
}

impl ExecutionService {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        agents: Arc<dyn AgentDirectory>,
        logs: Arc<dyn ExecutionLogStore>,
        provider: Arc<dyn LlmProvider>,
        settings: ExecutionConfig,
    ) -> Self {
        Self {
            rate_limiter,
            agents,
            logs,
            provider,
            settings,
        }
    }

    /// Execute an agent and return the response together with the tenant's
    /// remaining quota.
    ///
    /// Malformed requests, including an unsupported model, are rejected
    /// before the rate limiter is consulted, so they cost no quota. Once the
    /// request is well formed, quota is charged before the agent lookup, so
    /// a request for a missing agent does consume it. A denial becomes
    /// [`PlatformError::RateLimitExceeded`]; an unreachable rate limit store
    /// becomes [`PlatformError::ServiceUnavailable`] and is not retried here.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, agent_id = %agent_id, model = %request.model))]
    pub async fn execute_agent(
        &self,
        tenant_id: &Uuid,
        agent_id: &Uuid,
        request: &ExecutionRequest,
    ) -> Result<(ExecutionResponse, u32)> {
        // Reject malformed input before it can cost quota
        request.validate(&self.settings)?;

        let rate = self.rate_limiter.check_and_consume(tenant_id).await?;
        if !rate.allowed {
            return Err(PlatformError::RateLimitExceeded {
                retry_after: rate.retry_after,
                limit: self.rate_limiter.limit(),
                window_seconds: self.rate_limiter.window_seconds(),
            });
        }

        // Only agents owned by this tenant are visible
        let agent = self.agents.agent_for_execution(tenant_id, agent_id).await?;

        info!(agent_name = %agent.name, "Starting agent execution");

        let response_text = self
            .provider
            .generate(
                &agent,
                &request.prompt,
                &request.model,
                request.temperature,
                request.max_tokens,
            )
            .await?;

        let log = self
            .logs
            .append(NewExecutionLog {
                tenant_id: *tenant_id,
                agent_id: agent.id,
                agent_name: agent.name.clone(),
                prompt: request.prompt.clone(),
                model: request.model.clone(),
                response: response_text.clone(),
            })
            .await?;

        info!(
            execution_id = %log.id,
            response_length = response_text.len(),
            "Completed agent execution"
        );

        let warning = agent.tools.is_empty().then(|| NO_TOOLS_WARNING.to_string());

        let response = ExecutionResponse {
            execution_id: log.id,
            agent_id: agent.id,
            agent_name: agent.name,
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            response: response_text,
            tools_available: agent.tools,
            warning,
            executed_at: log.created_at,
        };

        Ok((response, rate.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{AgentProfile, InMemoryAgentDirectory, InMemoryExecutionLogStore, MockLlmProvider};
    use crate::ratelimit::{InMemoryBackend, RateLimitBackend, RateLimitError, RateLimitResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownBackend;

    #[async_trait]
    impl RateLimitBackend for DownBackend {
        async fn check_and_consume(&self, _: &str, _: u32, _: u64) -> std::result::Result<RateLimitResult, RateLimitError> {
            Err(RateLimitError::unavailable("redis_connection_failed", "refused"))
        }

        async fn get_remaining(&self, _: &str, _: u32, _: u64) -> std::result::Result<u32, RateLimitError> {
            Err(RateLimitError::unavailable("redis_connection_failed", "refused"))
        }

        async fn close(&self) {}
    }

    /// Provider that counts calls.
    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn generate(
            &self,
            _agent: &AgentProfile,
            _prompt: &str,
            _model: &str,
            _temperature: f64,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Mock LLM response".to_string())
        }
    }

    struct Fixture {
        service: ExecutionService,
        logs: Arc<InMemoryExecutionLogStore>,
        provider: Arc<CountingProvider>,
        tenant_id: Uuid,
        agent: AgentProfile,
    }

    fn fixture(backend: Arc<dyn RateLimitBackend>, limit: u32, tools: &[&str]) -> Fixture {
        let tenant_id = Uuid::new_v4();
        let agent = AgentProfile {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Test Agent".to_string(),
            role: "assistant".to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        };
        let agents = Arc::new(InMemoryAgentDirectory::new());
        agents.insert(agent.clone());
        let logs = Arc::new(InMemoryExecutionLogStore::new());
        let provider = Arc::new(CountingProvider::default());
        let limiter = Arc::new(RateLimiter::new(backend, limit, 60).unwrap());

        let service = ExecutionService::new(
            limiter,
            agents,
            logs.clone(),
            provider.clone(),
            ExecutionConfig::default(),
        );

        Fixture {
            service,
            logs,
            provider,
            tenant_id,
            agent,
        }
    }

    fn request(model: &str) -> ExecutionRequest {
        ExecutionRequest {
            prompt: "Summarize the quarterly report".to_string(),
            model: model.to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_execute_agent_success() {
        let f = fixture(Arc::new(InMemoryBackend::new()), 100, &["search"]);

        let (response, remaining) = f
            .service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(remaining, 99);
        assert_eq!(response.agent_id, f.agent.id);
        assert_eq!(response.agent_name, "Test Agent");
        assert_eq!(response.response, "Mock LLM response");
        assert_eq!(response.tools_available, vec!["search".to_string()]);
        assert!(response.warning.is_none());

        let history = f.logs.list_for_tenant(&f.tenant_id, 10, 0).await.unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.items[0].id, response.execution_id);
    }

    #[tokio::test]
    async fn test_warning_when_agent_has_no_tools() {
        let f = fixture(Arc::new(InMemoryBackend::new()), 100, &[]);

        let (response, _) = f
            .service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-5"))
            .await
            .unwrap();

        assert_eq!(response.warning.as_deref(), Some(NO_TOOLS_WARNING));
    }

    #[tokio::test]
    async fn test_denied_request_raises_rate_limit_error() {
        let f = fixture(Arc::new(InMemoryBackend::new()), 1, &["search"]);
        f.service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-5"))
            .await
            .unwrap();

        let err = f
            .service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-5"))
            .await
            .unwrap_err();

        match err {
            PlatformError::RateLimitExceeded {
                retry_after,
                limit,
                window_seconds,
            } => {
                assert!(retry_after >= 1);
                assert_eq!(limit, 1);
                assert_eq!(window_seconds, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_fault_raises_service_unavailable() {
        let f = fixture(Arc::new(DownBackend), 10, &[]);

        let err = f
            .service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-5"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_model_costs_no_quota() {
        let backend = Arc::new(InMemoryBackend::new());
        let f = fixture(backend.clone(), 5, &[]);

        let err = f
            .service
            .execute_agent(&f.tenant_id, &f.agent.id, &request("gpt-2"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "INVALID_MODEL");
        assert_eq!(backend.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found_and_costs_quota() {
        let backend = Arc::new(InMemoryBackend::new());
        let f = fixture(backend.clone(), 5, &[]);

        let err = f
            .service
            .execute_agent(&f.tenant_id, &Uuid::new_v4(), &request("gpt-5"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "AGENT_NOT_FOUND");
        let key = format!("ratelimit:{}", f.tenant_id);
        assert_eq!(backend.get_remaining(&key, 5, 60).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_uses_mock_provider_end_to_end() {
        let tenant_id = Uuid::new_v4();
        let agent = AgentProfile {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Scout".to_string(),
            role: "researcher".to_string(),
            tools: vec!["search".to_string()],
        };
        let agents = Arc::new(InMemoryAgentDirectory::new());
        agents.insert(agent.clone());
        let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryBackend::new()), 3, 60).unwrap());
        let service = ExecutionService::new(
            limiter,
            agents,
            Arc::new(InMemoryExecutionLogStore::new()),
            Arc::new(MockLlmProvider::new()),
            ExecutionConfig::default(),
        );

        let (response, remaining) = service
            .execute_agent(&tenant_id, &agent.id, &request("gpt-5"))
            .await
            .unwrap();

        assert_eq!(remaining, 2);
        assert!(response.response.starts_with("[Mock Response] Agent 'Scout'"));
    }

    #[test]
    fn test_request_validation() {
        let settings = ExecutionConfig::default();

        assert!(request("gpt-5").validate(&settings).is_ok());

        let mut empty = request("gpt-5");
        empty.prompt.clear();
        assert_eq!(empty.validate(&settings).unwrap_err().error_code(), "VALIDATION_ERROR");

        let mut hot = request("gpt-5");
        hot.temperature = 2.5;
        assert!(hot.validate(&settings).is_err());

        let mut long = request("gpt-5");
        long.max_tokens = Some(5000);
        assert!(long.validate(&settings).is_err());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let parsed: ExecutionRequest =
            serde_json::from_str(r#"{"prompt": "hi", "model": "gpt-5"}"#).unwrap();
        assert_eq!(parsed.temperature, 0.7);
        assert!(parsed.max_tokens.is_none());
    }
}
