// ABOUTME: Identity types carried through request extensions
// ABOUTME: Authenticated agents, users, and the authorisation helpers on User

use serde::{Deserialize, Serialize};

/// An authenticated API agent, injected into request extensions by the
/// agent-auth middleware.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub team: String,
    pub rate_limit: i32,
}

/// A user's membership in a team with a role of "admin" or "member".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team: String,
    pub role: String,
}

/// An authenticated UI user, injected into request extensions by the
/// session middlewares.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub teams: Vec<TeamMembership>,
    pub role: String,
}

impl User {
    pub fn is_org_admin(&self) -> bool {
        self.role == "org_admin"
    }

    pub fn is_team_admin(&self, team: &str) -> bool {
        self.teams
            .iter()
            .any(|tm| tm.team == team && tm.role == "admin")
    }

    pub fn in_team(&self, team: &str) -> bool {
        self.teams.iter().any(|tm| tm.team == team)
    }

    pub fn can_manage_team(&self, team: &str) -> bool {
        self.is_org_admin() || self.is_team_admin(team)
    }

    pub fn team_names(&self) -> Vec<String> {
        self.teams.iter().map(|tm| tm.team.clone()).collect()
    }
}
