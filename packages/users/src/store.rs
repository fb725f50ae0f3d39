// ABOUTME: Postgres-backed store for users and login sessions
// ABOUTME: Session tokens are random, stored hashed, and expire after 7 days

use crate::types::{CreateUserInput, Session, TeamMembership, UpdateUserInput, User};
use chrono::{Duration, Utc};
use octroi_storage::{StorageError, StorageResult};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const SESSION_DURATION_DAYS: i64 = 7;

const USER_COLUMNS: &str = "id, email, password_hash, name, teams, role, created_at";

#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn scan_user(row: &PgRow) -> StorageResult<User> {
        let teams: Vec<TeamMembership> = row
            .try_get::<Option<serde_json::Value>, _>("teams")?
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            teams,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn create(&self, input: CreateUserInput) -> StorageResult<User> {
        let hash = bcrypt::hash(&input.password, bcrypt::DEFAULT_COST)
            .map_err(|e| StorageError::Other(format!("hashing password: {e}")))?;
        let role = if input.role.is_empty() {
            "member".to_string()
        } else {
            input.role.clone()
        };
        let teams = serde_json::to_value(&input.teams)?;
        let id = Uuid::new_v4().to_string();

        let sql = format!(
            "INSERT INTO users (id, email, password_hash, name, teams, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&input.email)
            .bind(&hash)
            .bind(&input.name)
            .bind(&teams)
            .bind(&role)
            .fetch_one(&self.pool)
            .await?;
        Self::scan_user(&row)
    }

    pub async fn get_by_id(&self, id: &str) -> StorageResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::scan_user(&row)
    }

    pub async fn get_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::scan_user).transpose()
    }

    pub async fn list(&self) -> StorageResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::scan_user).collect()
    }

    pub async fn update(&self, id: &str, input: UpdateUserInput) -> StorageResult<User> {
        if input.email.is_none()
            && input.password.is_none()
            && input.name.is_none()
            && input.teams.is_none()
            && input.role.is_none()
        {
            return self.get_by_id(id).await;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut sep = qb.separated(", ");
        if let Some(email) = &input.email {
            sep.push("email = ").push_bind_unseparated(email.clone());
        }
        if let Some(password) = &input.password {
            let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
                .map_err(|e| StorageError::Other(format!("hashing password: {e}")))?;
            sep.push("password_hash = ").push_bind_unseparated(hash);
        }
        if let Some(name) = &input.name {
            sep.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(teams) = &input.teams {
            let json = serde_json::to_value(teams)?;
            sep.push("teams = ").push_bind_unseparated(json);
        }
        if let Some(role) = &input.role {
            sep.push("role = ").push_bind_unseparated(role.clone());
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::scan_user(&row)
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Verify a plaintext password against the stored bcrypt hash.
    pub fn check_password(user: &User, password: &str) -> bool {
        bcrypt::verify(password, &user.password_hash).unwrap_or(false)
    }

    /// Create a session for the user. Returns the plaintext token, which is
    /// shown to the client exactly once, and the stored session row.
    pub async fn create_session(&self, user_id: &str) -> StorageResult<(String, Session)> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let token_hash = hash_token(&plaintext);

        let now = Utc::now();
        let expires_at = now + Duration::days(SESSION_DURATION_DAYS);

        let row = sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING token_hash, user_id, created_at, expires_at",
        )
        .bind(&token_hash)
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        let session = Session {
            token_hash: row.try_get("token_hash")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        };
        Ok((plaintext, session))
    }

    /// Resolve a plaintext session token to its user. Returns `None` for
    /// unknown or expired sessions.
    pub async fn get_session_user(&self, plaintext: &str) -> StorageResult<Option<User>> {
        let token_hash = hash_token(plaintext);
        let row = sqlx::query(
            "SELECT u.id, u.email, u.password_hash, u.name, u.teams, u.role, u.created_at \
             FROM sessions s JOIN users u ON s.user_id = u.id \
             WHERE s.token_hash = $1 AND s.expires_at > now()",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::scan_user).transpose()
    }

    pub async fn delete_session(&self, plaintext: &str) -> StorageResult<()> {
        let token_hash = hash_token(plaintext);
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove all expired sessions, returning how many were deleted.
    pub async fn clean_expired_sessions(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn password_round_trip() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        let user = User {
            id: "u1".into(),
            email: "a@b.c".into(),
            password_hash: hash,
            name: "a".into(),
            teams: vec![],
            role: "member".into(),
            created_at: Utc::now(),
        };
        assert!(UserStore::check_password(&user, "hunter2"));
        assert!(!UserStore::check_password(&user, "wrong"));
    }
}
