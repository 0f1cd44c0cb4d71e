//! LLM provider abstraction and the built-in mock.

use async_trait::async_trait;
use uuid::Uuid;

use super::directory::AgentProfile;
use crate::error::Result;

/// Number of prompt characters quoted back in mock responses.
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Generates a completion for an agent.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        agent: &AgentProfile,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}

/// Deterministic stand-in for a real model.
///
/// The same agent, prompt and model always produce the same text.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockLlmProvider;

impl MockLlmProvider {
    pub fn new() -> Self {
        Self
    }

    fn response_id(agent: &AgentProfile, prompt: &str, model: &str) -> String {
        let input = format!("{}:{}:{}", agent.id, prompt, model);
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes());
        digest.simple().to_string()[..8].to_string()
    }

    fn preview(prompt: &str) -> String {
        if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
            let head: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            prompt.to_string()
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(
        &self,
        agent: &AgentProfile,
        prompt: &str,
        model: &str,
        _temperature: f64,
        _max_tokens: Option<u32>,
    ) -> Result<String> {
        let preview = Self::preview(prompt);
        let response_id = Self::response_id(agent, prompt, model);

        let response = if agent.tools.is_empty() {
            format!(
                "[Mock Response] Agent '{}' (role: {}) processed your request with no tools available. \
                 Based on the task '{}', here is a simulated response. [Response ID: {}]",
                agent.name, agent.role, preview, response_id
            )
        } else {
            format!(
                "[Mock Response] Agent '{}' (role: {}) processed your request using tools: [{}]. \
                 Based on the task '{}', here is a simulated response demonstrating the agent's capabilities. \
                 [Response ID: {}]",
                agent.name,
                agent.role,
                agent.tools.join(", "),
                preview,
                response_id
            )
        };

        Ok(response)
    }
}
