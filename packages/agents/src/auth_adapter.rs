// ABOUTME: Bridges the agent store to the auth substrate
// ABOUTME: Key-hash lookup returning the lightweight identity type

use crate::store::AgentStore;
use async_trait::async_trait;
use octroi_auth::AgentLookup;
use octroi_storage::StorageError;

#[async_trait]
impl AgentLookup for AgentStore {
    async fn get_by_key_hash(
        &self,
        hash: &str,
    ) -> Result<Option<octroi_auth::Agent>, StorageError> {
        let agent = AgentStore::get_by_key_hash(self, hash).await?;
        Ok(agent.map(|a| octroi_auth::Agent {
            id: a.id,
            name: a.name,
            team: a.team,
            rate_limit: a.rate_limit,
        }))
    }
}
