//! In-process store used when no database is configured, and by tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::models::{
    ApiKey, ApiKeyPatch, DailyUsage, NewApiKey, NewSession, NewUser, QuotaConsumption, Session,
    UsageLogEntry, User, UserPatch,
};
use super::pool::DbError;
use super::store::Store;

#[derive(Default)]
pub struct MemoryStore {
    /// One lock over all users keeps the email uniqueness check atomic
    users: RwLock<HashMap<Uuid, User>>,
    api_keys: DashMap<Uuid, ApiKey>,
    sessions: DashMap<String, Session>,
    usage: DashMap<Uuid, UsageLogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All usage rows, for assertions
    #[cfg(test)]
    pub fn usage_entries(&self) -> Vec<UsageLogEntry> {
        self.usage.iter().map(|e| e.value().clone()).collect()
    }

    /// Overwrite a key row directly, for setting up rollover and expiry cases
    #[cfg(test)]
    pub fn put_api_key(&self, key: ApiKey) {
        self.api_keys.insert(key.id, key);
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DbError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DbError> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == user.email) {
            return Err(DbError::Conflict("users_email_key".to_string()));
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            plan: user.plan,
            is_verified: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, DbError> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = patch.full_name {
            user.full_name = full_name;
        }
        if let Some(plan) = patch.plan {
            user.plan = plan;
        }
        if let Some(is_verified) = patch.is_verified {
            user.is_verified = is_verified;
        }
        if let Some(is_active) = patch.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn find_api_key_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, DbError> {
        Ok(self
            .api_keys
            .iter()
            .find(|k| k.key_value == key_value)
            .map(|k| k.value().clone()))
    }

    async fn find_api_key_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, DbError> {
        Ok(self.api_keys.get(&id).map(|k| k.value().clone()))
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, DbError> {
        let mut keys: Vec<ApiKey> = self
            .api_keys
            .iter()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.value().clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn create_api_key(&self, key: NewApiKey) -> Result<ApiKey, DbError> {
        if self.api_keys.iter().any(|k| k.key_value == key.key_value) {
            return Err(DbError::Conflict("api_keys_key_value_key".to_string()));
        }
        if !self.users.read().contains_key(&key.user_id) {
            return Err(DbError::Config(format!("user {} does not exist", key.user_id)));
        }
        let now = Utc::now();
        let record = ApiKey {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            key_value: key.key_value,
            name: key.name,
            is_active: true,
            daily_limit: key.daily_limit,
            requests_today: 0,
            last_reset_date: now.date_naive(),
            expires_at: key.expires_at,
            created_at: now,
        };
        self.api_keys.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_api_key(&self, id: Uuid, patch: ApiKeyPatch) -> Result<Option<ApiKey>, DbError> {
        if let Some(ref value) = patch.key_value {
            if self.api_keys.iter().any(|k| k.id != id && &k.key_value == value) {
                return Err(DbError::Conflict("api_keys_key_value_key".to_string()));
            }
        }
        let Some(mut key) = self.api_keys.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            key.name = name;
        }
        if let Some(is_active) = patch.is_active {
            key.is_active = is_active;
        }
        if let Some(key_value) = patch.key_value {
            key.key_value = key_value;
        }
        if let Some(daily_limit) = patch.daily_limit {
            key.daily_limit = daily_limit;
        }
        Ok(Some(key.clone()))
    }

    async fn delete_api_key(&self, id: Uuid) -> Result<bool, DbError> {
        Ok(self.api_keys.remove(&id).is_some())
    }

    async fn set_daily_limit_for_user(&self, user_id: Uuid, daily_limit: i32) -> Result<u64, DbError> {
        let mut changed = 0;
        for mut key in self.api_keys.iter_mut() {
            if key.user_id == user_id {
                key.daily_limit = daily_limit;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn consume_daily_quota(
        &self,
        key_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<QuotaConsumption>, DbError> {
        // The shard write lock held by `get_mut` serializes callers on this key.
        let Some(mut key) = self.api_keys.get_mut(&key_id) else {
            return Ok(None);
        };
        let used = key.used_on(today);
        if used >= key.daily_limit {
            return Ok(Some(QuotaConsumption::Denied {
                used,
                limit: key.daily_limit,
            }));
        }
        key.requests_today = used + 1;
        if key.last_reset_date < today {
            key.last_reset_date = today;
        }
        Ok(Some(QuotaConsumption::Admitted {
            used: key.requests_today,
            limit: key.daily_limit,
        }))
    }

    async fn log_usage(&self, entry: &UsageLogEntry) -> Result<(), DbError> {
        self.usage
            .entry(entry.id)
            .and_modify(|row| {
                if entry.status_code.is_some() {
                    row.status_code = entry.status_code;
                }
                if entry.response_time.is_some() {
                    row.response_time = entry.response_time;
                }
            })
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn daily_usage(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<DailyUsage>, DbError> {
        // (requests, errors, latency sum, latency samples)
        let mut days: BTreeMap<NaiveDate, (i64, i64, i64, i64)> = BTreeMap::new();
        for row in self.usage.iter() {
            let day = row.created_at.date_naive();
            if row.user_id != user_id || day < since {
                continue;
            }
            let bucket = days.entry(day).or_default();
            bucket.0 += 1;
            if row.status_code.is_some_and(|s| s >= 400) {
                bucket.1 += 1;
            }
            if let Some(ms) = row.response_time {
                bucket.2 += ms as i64;
                bucket.3 += 1;
            }
        }
        Ok(days
            .into_iter()
            .map(|(date, (requests, errors, sum, samples))| DailyUsage {
                date,
                requests,
                errors,
                avg_response_ms: (samples > 0).then(|| sum as f64 / samples as f64),
            })
            .collect())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, DbError> {
        let record = Session {
            id: session.id,
            user_id: session.user_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            expires_at: session.expires_at,
            created_at: Utc::now(),
        };
        self.sessions.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_session(&self, id: &str, user_id: Uuid) -> Result<bool, DbError> {
        Ok(self
            .sessions
            .remove_if(id, |_, s| s.user_id == user_id)
            .is_some())
    }

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - self.sessions.len()) as u64)
    }
}
