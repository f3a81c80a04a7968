//! Authentication, quota and plan failures
//!
//! Framework independent: the HTTP layer turns these into envelopes using
//! [`AccessError::code`], [`AccessError::status`] and [`AccessError::data`].

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::Plan;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccessError {
    // Bearer token
    #[error("Authentication token required")]
    TokenRequired,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication token has expired")]
    TokenExpired,
    #[error("User not found")]
    UserNotFound,
    #[error("Account has been deactivated")]
    AccountDeactivated,

    // API key
    #[error("API key required. Provide via X-API-Key header or Authorization: Bearer <key>")]
    ApiKeyMissing,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("API key has been deactivated")]
    ApiKeyDeactivated,
    #[error("API key has expired")]
    ApiKeyExpired { expires_at: DateTime<Utc> },
    #[error("User account is inactive")]
    UserInactive,

    // Quota and burst limits
    #[error("Daily request limit exceeded")]
    RateLimitExceeded { limit: i32, used: i32 },
    #[error("Too many requests, slow down")]
    RateLimited { limit: u32, retry_after_secs: u64 },
    #[error("Failed to check API usage")]
    UsageCheckFailed,

    // Plans
    #[error("Authentication required")]
    AuthRequired,
    #[error("This feature requires a different plan")]
    PlanRequired { current_plan: Plan, required_plans: Vec<Plan> },
    #[error("Admin access required")]
    AdminRequired,

    /// Unexpected failure while authenticating (store down, ...)
    #[error("Authentication failed")]
    AuthFailed(String),
}

impl AccessError {
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::TokenRequired => "TOKEN_REQUIRED",
            AccessError::InvalidToken => "INVALID_TOKEN",
            AccessError::TokenExpired => "TOKEN_EXPIRED",
            AccessError::UserNotFound => "USER_NOT_FOUND",
            AccessError::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            AccessError::ApiKeyMissing => "API_KEY_MISSING",
            AccessError::InvalidApiKey => "INVALID_API_KEY",
            AccessError::ApiKeyDeactivated => "API_KEY_DEACTIVATED",
            AccessError::ApiKeyExpired { .. } => "API_KEY_EXPIRED",
            AccessError::UserInactive => "USER_INACTIVE",
            AccessError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AccessError::RateLimited { .. } => "RATE_LIMITED",
            AccessError::UsageCheckFailed => "USAGE_CHECK_FAILED",
            AccessError::AuthRequired => "AUTH_REQUIRED",
            AccessError::PlanRequired { .. } => "PLAN_REQUIRED",
            AccessError::AdminRequired => "ADMIN_REQUIRED",
            AccessError::AuthFailed(_) => "AUTH_FAILED",
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            AccessError::TokenRequired
            | AccessError::InvalidToken
            | AccessError::TokenExpired
            | AccessError::UserNotFound
            | AccessError::ApiKeyMissing
            | AccessError::InvalidApiKey
            | AccessError::ApiKeyDeactivated
            | AccessError::ApiKeyExpired { .. }
            | AccessError::UserInactive
            | AccessError::AuthRequired => 401,
            AccessError::AccountDeactivated
            | AccessError::PlanRequired { .. }
            | AccessError::AdminRequired => 403,
            AccessError::RateLimitExceeded { .. } | AccessError::RateLimited { .. } => 429,
            AccessError::UsageCheckFailed | AccessError::AuthFailed(_) => 500,
        }
    }

    /// Machine-readable payload for the envelope's `data` field
    pub fn data(&self) -> Option<Value> {
        match self {
            AccessError::ApiKeyExpired { expires_at } => Some(json!({ "expires_at": expires_at })),
            AccessError::RateLimitExceeded { limit, used } => Some(json!({
                "limit": limit,
                "used": used,
                "remaining": 0,
            })),
            AccessError::RateLimited { limit, retry_after_secs } => Some(json!({
                "limit": limit,
                "remaining": 0,
                "retry_after": retry_after_secs,
            })),
            AccessError::PlanRequired { current_plan, required_plans } => Some(json!({
                "current_plan": current_plan,
                "required_plans": required_plans,
            })),
            _ => None,
        }
    }

    /// Rejections of the presented token or key, as opposed to quota, plan or
    /// store failures
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AccessError::TokenRequired
                | AccessError::InvalidToken
                | AccessError::TokenExpired
                | AccessError::UserNotFound
                | AccessError::AccountDeactivated
                | AccessError::ApiKeyMissing
                | AccessError::InvalidApiKey
                | AccessError::ApiKeyDeactivated
                | AccessError::ApiKeyExpired { .. }
                | AccessError::UserInactive
        )
    }

    /// Internal detail worth exposing outside production
    pub fn detail(&self) -> Option<&str> {
        match self {
            AccessError::AuthFailed(detail) => Some(detail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_payload() {
        let err = AccessError::RateLimitExceeded { limit: 10, used: 10 };
        assert_eq!(err.status(), 429);
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.data(), Some(json!({ "limit": 10, "used": 10, "remaining": 0 })));
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(AccessError::AccountDeactivated.status(), 403);
        assert_eq!(AccessError::InvalidApiKey.status(), 401);
        assert_eq!(AccessError::UsageCheckFailed.status(), 500);
        assert_eq!(AccessError::AdminRequired.status(), 403);
    }

    #[test]
    fn test_plan_required_payload() {
        let err = AccessError::PlanRequired {
            current_plan: Plan::Free,
            required_plans: vec![Plan::Pro, Plan::Enterprise],
        };
        assert_eq!(
            err.data(),
            Some(json!({ "current_plan": "free", "required_plans": ["pro", "enterprise"] }))
        );
    }
}
