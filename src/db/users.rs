//! User database operations

use super::models::{NewUser, User, UserPatch};
use super::pool::{DbError, DbPool};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, full_name, plan, is_verified, is_active, created_at, updated_at";

/// Repository for user operations
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
            &[&id]
        ).await?;

        Ok(row.as_ref().map(User::from_row))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
            &[&email]
        ).await?;

        Ok(row.as_ref().map(User::from_row))
    }

    pub async fn create(&self, user: NewUser) -> Result<User, DbError> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();

        let row = client.query_one(
            &format!(
                r#"
                INSERT INTO users (id, email, password_hash, full_name, plan)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[&id, &user.email, &user.password_hash, &user.full_name, &user.plan.as_str()]
        ).await?;

        info!(user_id = %id, plan = %user.plan, "Created user");

        Ok(User::from_row(&row))
    }

    pub async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, DbError> {
        let client = self.pool.get().await?;
        let plan = patch.plan.map(|p| p.as_str());

        let row = client.query_opt(
            &format!(
                r#"
                UPDATE users SET
                    full_name = COALESCE($2, full_name),
                    plan = COALESCE($3, plan),
                    is_verified = COALESCE($4, is_verified),
                    is_active = COALESCE($5, is_active),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ),
            &[&id, &patch.full_name, &plan, &patch.is_verified, &patch.is_active]
        ).await?;

        Ok(row.as_ref().map(User::from_row))
    }
}
