//! Database module
//!
//! PostgreSQL repositories (one per table) behind the [`Store`] trait, plus an
//! in-memory implementation for running without a database.

pub mod api_keys;
pub mod memory;
pub mod models;
pub mod pool;
pub mod sessions;
pub mod store;
pub mod usage;
pub mod users;

pub use api_keys::{generate_key_value, key_fingerprint};
pub use memory::MemoryStore;
pub use models::{
    ApiKey, ApiKeyPatch, DailyUsage, NewApiKey, NewSession, NewUser, QuotaConsumption,
    UsageLogEntry, User, UserPatch,
};
pub use pool::{DbError, DbPool};
pub use store::{PgStore, Store};
