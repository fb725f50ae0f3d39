// ABOUTME: Agent accounts and spending budgets
// ABOUTME: Stores for agents, per-agent-per-tool budgets, and budget enforcement

pub mod auth_adapter;
pub mod budgets;
pub mod store;
pub mod types;

pub use budgets::{BudgetDecision, BudgetStore, GlobalBudgetDecision};
pub use store::AgentStore;
pub use types::{Agent, AgentListParams, Budget, CreateAgentInput, SetBudgetInput, UpdateAgentInput};
