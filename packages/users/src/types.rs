// ABOUTME: User and session type definitions
// ABOUTME: Accounts with team memberships and org-level roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's membership in a team with a role of "admin" or "member".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team: String,
    pub role: String,
}

/// A registered user account. Role is "org_admin" or "member".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub teams: Vec<TeamMembership>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub teams: Vec<TeamMembership>,
    #[serde(default)]
    pub role: String,
}

/// Optional fields for a partial user update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub teams: Option<Vec<TeamMembership>>,
    pub role: Option<String>,
}

/// An active login session, keyed by the sha256 hash of its token.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
