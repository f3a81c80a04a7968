//! Access control
//!
//! Authentication, daily quota accounting, usage recording, burst limiting
//! and plan gating. Nothing in here knows about HTTP.

pub mod authenticator;
pub mod error;
pub mod jwt;
pub mod ledger;
pub mod password;
pub mod plan_gate;
pub mod rate_limiter;
pub mod recorder;

pub use authenticator::{ApiKeyAuthentication, Authenticator};
pub use error::AccessError;
pub use jwt::JwtKeys;
pub use password::{hash_password, verify_password};
pub use plan_gate::{require_admin, require_plan};
pub use rate_limiter::SlidingWindowLimiter;
pub use recorder::UsageRecorder;
