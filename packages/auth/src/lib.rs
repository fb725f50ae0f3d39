// ABOUTME: Authentication substrate for the Octroi gateway
// ABOUTME: API key material, identity types, and the request auth middlewares

pub mod identity;
pub mod keys;
pub mod middleware;

pub use identity::{Agent, TeamMembership, User};
pub use keys::{generate_api_key, hash_key, verify_key_hash, ApiKey, KEY_PREFIX};
pub use middleware::{
    admin_session, agent_auth, extract_bearer_token, member_session, AgentAuthLayer, AuthHooks,
    SessionLayer,
};

use async_trait::async_trait;
use octroi_storage::StorageError;

/// Lookup of agents by their API key hash, implemented by the agent store.
#[async_trait]
pub trait AgentLookup: Send + Sync {
    async fn get_by_key_hash(&self, hash: &str) -> Result<Option<Agent>, StorageError>;
}

/// Resolution of session tokens to users, implemented by the user store.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn lookup_session(&self, token: &str) -> Result<Option<User>, StorageError>;
}
