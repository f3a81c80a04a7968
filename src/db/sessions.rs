//! Session database operations

use super::models::{NewSession, Session};
use super::pool::{DbError, DbPool};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRepository {
    pool: DbPool,
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: NewSession) -> Result<Session, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_one(
            r#"
            INSERT INTO sessions (id, user_id, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, ip_address, user_agent, expires_at, created_at
            "#,
            &[&session.id, &session.user_id, &session.ip_address, &session.user_agent, &session.expires_at]
        ).await?;

        Ok(Session::from_row(&row))
    }

    /// Delete a session owned by `user_id`
    pub async fn delete(&self, id: &str, user_id: Uuid) -> Result<bool, DbError> {
        let client = self.pool.get().await?;

        let result = client.execute(
            "DELETE FROM sessions WHERE id = $1 AND user_id = $2",
            &[&id, &user_id]
        ).await?;

        Ok(result > 0)
    }

    /// Remove sessions past their expiry (call periodically)
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let client = self.pool.get().await?;

        let result = client.execute(
            "DELETE FROM sessions WHERE expires_at <= $1",
            &[&now]
        ).await?;

        if result > 0 {
            info!(deleted = result, "Cleaned up expired sessions");
        }

        Ok(result)
    }
}
