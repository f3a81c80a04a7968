//! HTTP error type
//!
//! Every failure leaves the service as the same envelope:
//! `{status: false, message, code, data?, stack?}`. `stack` carries internal
//! detail and is only filled outside production.

use actix_web::http::header::RETRY_AFTER;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::access::AccessError;
use crate::db::DbError;
use crate::providers::ProviderError;

use super::middleware::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING};

static EXPOSE_DETAIL: OnceCell<bool> = OnceCell::new();

/// Called once at startup; unset behaves like production.
pub fn expose_error_detail(expose: bool) {
    let _ = EXPOSE_DETAIL.set(expose);
}

fn detail_exposed() -> bool {
    EXPOSE_DETAIL.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Access(#[from] AccessError),

    #[error("{0}")]
    Validation(String),

    #[error("Email is already registered")]
    EmailExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidRequest(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Access(e) => e.code(),
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::EmailExists => "EMAIL_EXISTS",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Database(DbError::Conflict(_)) => "CONFLICT",
            ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Database(DbError::Conflict(_)) => "Resource already exists".to_string(),
            ApiError::Database(_) | ApiError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Access(e) => e.detail().map(str::to_string),
            ApiError::Database(e) => Some(e.to_string()),
            ApiError::Internal(msg) => Some(msg.clone()),
            _ => None,
        }
    }

    /// Envelope body for this error
    pub fn body(&self) -> Value {
        let mut body = json!({
            "status": false,
            "message": self.message(),
            "code": self.code(),
        });
        if let ApiError::Access(e) = self {
            if let Some(data) = e.data() {
                body["data"] = data;
            }
        }
        if detail_exposed() {
            if let Some(detail) = self.detail() {
                body["stack"] = Value::String(detail);
            }
        }
        body
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Access(e) => {
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::EmailExists | ApiError::Database(DbError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let mut builder = HttpResponse::build(status);
        if let ApiError::Access(AccessError::RateLimited { limit, retry_after_secs }) = self {
            builder
                .insert_header((RETRY_AFTER, retry_after_secs.to_string()))
                .insert_header((RATE_LIMIT_LIMIT, limit.to_string()))
                .insert_header((RATE_LIMIT_REMAINING, "0"));
        }
        builder.json(self.body())
    }
}
