//! Per-request identity types
//!
//! The auth middleware builds exactly one [`RequestContext`] per request and
//! stores it in the request extensions. Handlers only ever read it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Plan;
use crate::db::{ApiKey, User};

/// Authenticated identity resolved from a bearer token or an API key
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub plan: Plan,
    pub is_verified: bool,
    pub is_active: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            plan: user.plan,
            is_verified: user.is_verified,
            is_active: user.is_active,
        }
    }
}

/// The API key a request was admitted with
#[derive(Debug, Clone, Serialize)]
pub struct KeyContext {
    pub key_id: Uuid,
    pub name: String,
    pub daily_limit: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&ApiKey> for KeyContext {
    fn from(key: &ApiKey) -> Self {
        Self {
            key_id: key.id,
            name: key.name.clone(),
            daily_limit: key.daily_limit,
            expires_at: key.expires_at,
        }
    }
}

/// Daily quota state right after the current request was counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct UsageSnapshot {
    pub used: i32,
    pub limit: i32,
    pub remaining: i32,
}

/// Request facts needed for authentication and usage records
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub endpoint: String,
    pub method: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Immutable identity context threaded through the handler chain
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub key: Option<KeyContext>,
    pub usage: Option<UsageSnapshot>,
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn anonymous(client_ip: Option<String>) -> Self {
        Self {
            client_ip,
            ..Self::default()
        }
    }

    pub fn for_user(principal: Principal, client_ip: Option<String>) -> Self {
        Self {
            principal: Some(principal),
            client_ip,
            ..Self::default()
        }
    }

    pub fn for_api_key(
        principal: Principal,
        key: KeyContext,
        usage: UsageSnapshot,
        client_ip: Option<String>,
    ) -> Self {
        Self {
            principal: Some(principal),
            key: Some(key),
            usage: Some(usage),
            client_ip,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}
