// ABOUTME: User accounts and login sessions
// ABOUTME: bcrypt-hashed passwords, sha256-hashed session tokens with a 7-day TTL

pub mod auth_adapter;
pub mod store;
pub mod types;

pub use store::UserStore;
pub use types::{CreateUserInput, Session, TeamMembership, UpdateUserInput, User};
