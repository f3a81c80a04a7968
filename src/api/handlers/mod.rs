//! HTTP request handlers

pub mod admin;
pub mod auth;
pub mod health;
pub mod keys;
pub mod plans;
pub mod proxy;
pub mod usage;

use crate::access::AccessError;
use crate::api::error::ApiError;
use crate::domain::{Principal, RequestContext};

/// Principal of a request that passed an auth gate
pub(crate) fn signed_in(ctx: &RequestContext) -> Result<&Principal, ApiError> {
    ctx.principal.as_ref().ok_or(ApiError::Access(AccessError::AuthRequired))
}

/// Trim and lowercase; rejects anything that is not `local@domain.tld`
pub(crate) fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid && email.len() <= 254 {
        Ok(email)
    } else {
        Err(ApiError::Validation("A valid email address is required".to_string()))
    }
}

pub(crate) fn require_name(raw: &str, field: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::Validation(format!("{field} must be 1-100 characters")));
    }
    Ok(name.to_string())
}
