//! Credential store contract
//!
//! Everything the access layer and the handlers need from persistence goes
//! through [`Store`]. [`PgStore`] backs it with PostgreSQL, and
//! [`super::MemoryStore`] keeps everything in process for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::api_keys::ApiKeyRepository;
use super::models::{
    ApiKey, ApiKeyPatch, DailyUsage, NewApiKey, NewSession, NewUser, QuotaConsumption, Session,
    UsageLogEntry, User, UserPatch,
};
use super::pool::{DbError, DbPool};
use super::sessions::SessionRepository;
use super::usage::UsageRepository;
use super::users::UserRepository;

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DbError>;
    /// `email` must already be normalized
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
    /// Fails with [`DbError::Conflict`] when the email is taken
    async fn create_user(&self, user: NewUser) -> Result<User, DbError>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, DbError>;

    async fn find_api_key_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, DbError>;
    async fn find_api_key_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, DbError>;
    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, DbError>;
    async fn create_api_key(&self, key: NewApiKey) -> Result<ApiKey, DbError>;
    async fn update_api_key(&self, id: Uuid, patch: ApiKeyPatch) -> Result<Option<ApiKey>, DbError>;
    async fn delete_api_key(&self, id: Uuid) -> Result<bool, DbError>;
    /// Sets `daily_limit` on every key the user owns, returning how many changed
    async fn set_daily_limit_for_user(&self, user_id: Uuid, daily_limit: i32) -> Result<u64, DbError>;

    /// Roll over if `last_reset_date < today`, then count one request if the
    /// key is below its limit. Linearizable per key. `None` if the key is gone.
    async fn consume_daily_quota(
        &self,
        key_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<QuotaConsumption>, DbError>;

    /// Insert or complete the row with `entry.id`. Status and latency are only
    /// ever filled in, never cleared.
    async fn log_usage(&self, entry: &UsageLogEntry) -> Result<(), DbError>;
    /// Per-day totals for a user's requests on or after `since`, oldest first
    async fn daily_usage(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<DailyUsage>, DbError>;

    async fn create_session(&self, session: NewSession) -> Result<Session, DbError>;
    async fn delete_session(&self, id: &str, user_id: Uuid) -> Result<bool, DbError>;
    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DbError>;
}

/// PostgreSQL-backed store composed of one repository per table
#[derive(Clone)]
pub struct PgStore {
    users: UserRepository,
    api_keys: ApiKeyRepository,
    sessions: SessionRepository,
    usage: UsageRepository,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            api_keys: ApiKeyRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            usage: UsageRepository::new(pool),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DbError> {
        self.users.get_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.users.get_by_email(email).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DbError> {
        self.users.create(user).await
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, DbError> {
        self.users.update(id, patch).await
    }

    async fn find_api_key_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, DbError> {
        self.api_keys.get_by_value(key_value).await
    }

    async fn find_api_key_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, DbError> {
        self.api_keys.get_by_id(id).await
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, DbError> {
        self.api_keys.list_by_user(user_id).await
    }

    async fn create_api_key(&self, key: NewApiKey) -> Result<ApiKey, DbError> {
        self.api_keys.create(key).await
    }

    async fn update_api_key(&self, id: Uuid, patch: ApiKeyPatch) -> Result<Option<ApiKey>, DbError> {
        self.api_keys.update(id, patch).await
    }

    async fn delete_api_key(&self, id: Uuid) -> Result<bool, DbError> {
        self.api_keys.delete(id).await
    }

    async fn set_daily_limit_for_user(&self, user_id: Uuid, daily_limit: i32) -> Result<u64, DbError> {
        self.api_keys.set_daily_limit_for_user(user_id, daily_limit).await
    }

    async fn consume_daily_quota(
        &self,
        key_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<QuotaConsumption>, DbError> {
        self.api_keys.consume_daily_quota(key_id, today).await
    }

    async fn log_usage(&self, entry: &UsageLogEntry) -> Result<(), DbError> {
        self.usage.log_usage(entry).await
    }

    async fn daily_usage(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<DailyUsage>, DbError> {
        self.usage.daily_usage(user_id, since).await
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, DbError> {
        self.sessions.create(session).await
    }

    async fn delete_session(&self, id: &str, user_id: Uuid) -> Result<bool, DbError> {
        self.sessions.delete(id, user_id).await
    }

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        self.sessions.cleanup_expired(now).await
    }
}
