//! Database models for users, API keys, sessions and usage logs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio_postgres::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Plan;

/// User record
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub plan: Plan,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &Row) -> Self {
        let plan: String = row.get("plan");
        User {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            full_name: row.get("full_name"),
            // Unknown plan names in the table degrade to the least privileged plan
            plan: plan.parse().unwrap_or(Plan::Free),
            is_verified: row.get("is_verified"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub plan: Plan,
}

/// Partial user update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub plan: Option<Plan>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
}

/// API key record
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_value: String,
    pub name: String,
    pub is_active: bool,
    pub daily_limit: i32,
    pub requests_today: i32,
    pub last_reset_date: NaiveDate,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub(crate) fn from_row(row: &Row) -> Self {
        ApiKey {
            id: row.get("id"),
            user_id: row.get("user_id"),
            key_value: row.get("key_value"),
            name: row.get("name"),
            is_active: row.get("is_active"),
            daily_limit: row.get("daily_limit"),
            requests_today: row.get("requests_today"),
            last_reset_date: row.get("last_reset_date"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }

    /// Count for `today` as the ledger would see it, without rolling over
    pub fn used_on(&self, today: NaiveDate) -> i32 {
        if self.last_reset_date < today {
            0
        } else {
            self.requests_today
        }
    }
}

/// Fields needed to create an API key
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: Uuid,
    pub key_value: String,
    pub name: String,
    pub daily_limit: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial API key update
#[derive(Debug, Clone, Default)]
pub struct ApiKeyPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the secret; the previous value stops resolving immediately
    pub key_value: Option<String>,
    pub daily_limit: Option<i32>,
}

/// Outcome of the atomic daily quota operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaConsumption {
    /// Counted; `used` includes this request
    Admitted { used: i32, limit: i32 },
    /// Limit already reached; nothing was written
    Denied { used: i32, limit: i32 },
}

/// Login session (audit only; bearer tokens are verified without it)
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn from_row(row: &Row) -> Self {
        Session {
            id: row.get("id"),
            user_id: row.get("user_id"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// One admitted API-key request.
///
/// Opened at authentication with `status_code`/`response_time` unset and
/// written again under the same `id` once the response is known.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: Option<i32>,
    /// Milliseconds
    pub response_time: Option<i32>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageLogEntry {
    pub fn is_finalized(&self) -> bool {
        self.status_code.is_some()
    }
}

/// Usage aggregated per calendar day
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub requests: i64,
    pub errors: i64,
    pub avg_response_ms: Option<f64>,
}

impl DailyUsage {
    pub(crate) fn from_row(row: &Row) -> Self {
        DailyUsage {
            date: row.get("day"),
            requests: row.get("requests"),
            errors: row.get("errors"),
            avg_response_ms: row.get("avg_response_ms"),
        }
    }
}
