//! Tenant and agent lookup.
//!
//! Tenant and agent records are owned elsewhere; the gateway only needs to
//! turn an API key into a tenant id and an agent id into the read-only
//! profile used for execution.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{AgentConfig, ApiKeyConfig};
use crate::error::{PlatformError, Result};

/// Resolves API keys to tenants.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve(&self, api_key: &str) -> Result<Uuid>;
}

/// Tenant directory backed by the configured key list.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory {
    keys: HashMap<String, Uuid>,
}

impl StaticTenantDirectory {
    pub fn new(entries: &[ApiKeyConfig]) -> Self {
        let keys = entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.tenant_id))
            .collect();
        Self { keys }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn resolve(&self, api_key: &str) -> Result<Uuid> {
        self.keys
            .get(api_key)
            .copied()
            .ok_or_else(|| PlatformError::Authentication {
                code: "INVALID_API_KEY",
                message: "The provided API key is invalid".to_string(),
            })
    }
}

/// What execution needs to know about an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub role: String,
    pub tools: Vec<String>,
}

impl From<&AgentConfig> for AgentProfile {
    fn from(config: &AgentConfig) -> Self {
        Self {
            id: config.id,
            tenant_id: config.tenant_id,
            name: config.name.clone(),
            role: config.role.clone(),
            tools: config.tools.clone(),
        }
    }
}

/// Looks up agents on behalf of a tenant.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// The agent, if it exists and belongs to `tenant_id`.
    async fn agent_for_execution(&self, tenant_id: &Uuid, agent_id: &Uuid) -> Result<AgentProfile>;
}

/// Agent directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAgentDirectory {
    agents: DashMap<Uuid, AgentProfile>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from configured agents.
    pub fn from_config(agents: &[AgentConfig]) -> Self {
        let directory = Self::new();
        for agent in agents {
            directory.insert(agent.into());
        }
        directory
    }

    pub fn insert(&self, agent: AgentProfile) {
        self.agents.insert(agent.id, agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn agent_for_execution(&self, tenant_id: &Uuid, agent_id: &Uuid) -> Result<AgentProfile> {
        // Agents of other tenants are reported as missing.
        match self.agents.get(agent_id) {
            Some(agent) if agent.tenant_id == *tenant_id => Ok(agent.clone()),
            _ => Err(PlatformError::NotFound {
                code: "AGENT_NOT_FOUND",
                message: format!("Agent {} not found", agent_id),
            }),
        }
    }
}
