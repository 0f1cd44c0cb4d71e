//! Execution log storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

/// One completed execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub prompt: String,
    pub model: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when recording an execution.
#[derive(Debug, Clone)]
pub struct NewExecutionLog {
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub prompt: String,
    pub model: String,
    pub response: String,
}

/// A page of a tenant's execution history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<ExecutionLog>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Stores execution logs.
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// Record an execution, assigning its id and timestamp.
    async fn append(&self, entry: NewExecutionLog) -> Result<ExecutionLog>;

    /// List a tenant's executions, newest first.
    async fn list_for_tenant(&self, tenant_id: &Uuid, limit: usize, offset: usize) -> Result<HistoryPage>;
}

/// Execution logs held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryExecutionLogStore {
    logs: RwLock<Vec<ExecutionLog>>,
}

impl InMemoryExecutionLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryExecutionLogStore {
    async fn append(&self, entry: NewExecutionLog) -> Result<ExecutionLog> {
        let log = ExecutionLog {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            agent_id: entry.agent_id,
            agent_name: entry.agent_name,
            prompt: entry.prompt,
            model: entry.model,
            response: entry.response,
            created_at: Utc::now(),
        };
        self.logs.write().push(log.clone());
        Ok(log)
    }

    async fn list_for_tenant(&self, tenant_id: &Uuid, limit: usize, offset: usize) -> Result<HistoryPage> {
        let logs = self.logs.read();
        let owned: Vec<&ExecutionLog> = logs
            .iter()
            .rev()
            .filter(|log| log.tenant_id == *tenant_id)
            .collect();

        let total = owned.len();
        let items: Vec<ExecutionLog> = owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(HistoryPage {
            has_more: offset + items.len() < total,
            items,
            total,
            limit,
            offset,
        })
    }
}
