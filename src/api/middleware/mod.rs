//! API Middleware Module
//!
//! Authentication, caller rate limiting and usage tracking for the gateway.

pub mod auth;
pub mod rate_limit;
pub mod service;
pub mod usage;

pub use auth::extract_session_id;
pub use rate_limit::{RateLimitGate, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING};
pub use service::{AuthGate, AuthMode};
