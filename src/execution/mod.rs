//! Agent execution and the collaborators it depends on.

mod directory;
mod history;
mod provider;
mod service;

pub use directory::{AgentDirectory, AgentProfile, InMemoryAgentDirectory, StaticTenantDirectory, TenantDirectory};
pub use history::{ExecutionLog, ExecutionLogStore, HistoryPage, InMemoryExecutionLogStore, NewExecutionLog};
pub use provider::{LlmProvider, MockLlmProvider};
pub use service::{ExecutionRequest, ExecutionResponse, ExecutionService};
