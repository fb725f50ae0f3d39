// ABOUTME: Bridges the user store to the auth substrate
// ABOUTME: Session token resolution returning the lightweight identity type

use crate::store::UserStore;
use async_trait::async_trait;
use octroi_auth::SessionLookup;
use octroi_storage::StorageError;

#[async_trait]
impl SessionLookup for UserStore {
    async fn lookup_session(
        &self,
        token: &str,
    ) -> Result<Option<octroi_auth::User>, StorageError> {
        let user = self.get_session_user(token).await?;
        Ok(user.map(|u| octroi_auth::User {
            id: u.id,
            email: u.email,
            name: u.name,
            teams: u
                .teams
                .into_iter()
                .map(|tm| octroi_auth::TeamMembership {
                    team: tm.team,
                    role: tm.role,
                })
                .collect(),
            role: u.role,
        }))
    }
}
