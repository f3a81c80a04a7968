//! Configuration module for the gateway

use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;

use crate::domain::Plan;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_environment")]
    pub environment: String,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub plans: PlanSettings,
    pub rate_limit: RateLimitSettings,
    pub proxy: ProxySettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Take the caller IP from `X-Forwarded-For`/`X-Real-IP`. Enable only
    /// behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Database configuration for PostgreSQL.
///
/// An empty `url` runs the gateway on the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
}

/// Bearer token and API key settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub password_min_length: usize,
    /// Accept `?api_key=` when no header carries a key.
    /// Keys in URLs end up in proxy logs; kept for older clients.
    pub allow_query_api_key: bool,
    pub session_sweep_interval_secs: u64,
}

/// Default daily request limits per plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSettings {
    pub free_daily_limit: i32,
    pub basic_daily_limit: i32,
    pub pro_daily_limit: i32,
    pub enterprise_daily_limit: i32,
    pub admin_daily_limit: i32,
}

impl PlanSettings {
    pub fn daily_limit(&self, plan: Plan) -> i32 {
        match plan {
            Plan::Free => self.free_daily_limit,
            Plan::Basic => self.basic_daily_limit,
            Plan::Pro => self.pro_daily_limit,
            Plan::Enterprise => self.enterprise_daily_limit,
            Plan::Admin => self.admin_daily_limit,
        }
    }
}

/// Process-local sliding window limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_ms: u64,
    /// Chance per call that stale windows get swept.
    pub gc_probability: f64,
}

/// Upstream AI and downloader services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    pub ai_base_url: String,
    pub ai_api_key: Option<String>,
    pub downloader_base_url: String,
    pub timeout_secs: u64,
    pub rate_limit_per_minute: u32,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with GATEWAY_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    /// 4. built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // GATEWAY_AUTH__JWT_SECRET, GATEWAY_SERVER__PORT, ...
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.jwt_secret must be set".to_string()));
        }
        if self.is_production() && self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::Message(
                "auth.jwt_secret must be changed in production".to_string(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Message("auth.token_ttl_hours must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.rate_limit.gc_probability) {
            return Err(ConfigError::Message(
                "rate_limit.gc_probability must be within 0..=1".to_string(),
            ));
        }
        Ok(())
    }
}

const DEV_JWT_SECRET: &str = "dev-only-change-me";

impl Default for Settings {
    fn default() -> Self {
        Settings {
            environment: default_environment(),
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: None,
                trust_forwarded_for: false,
            },
            database: DatabaseSettings {
                url: String::new(),
                max_connections: Some(10),
            },
            auth: AuthSettings {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_ttl_hours: 24,
                password_min_length: 8,
                allow_query_api_key: true,
                session_sweep_interval_secs: 3600,
            },
            plans: PlanSettings {
                free_daily_limit: 100,
                basic_daily_limit: 1_000,
                pro_daily_limit: 10_000,
                enterprise_daily_limit: 100_000,
                admin_daily_limit: 1_000_000,
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                max_requests: 60,
                window_ms: 60_000,
                gc_probability: 0.01,
            },
            proxy: ProxySettings {
                ai_base_url: "https://ai.invalid/v1".to_string(),
                ai_api_key: None,
                downloader_base_url: "https://downloader.invalid".to_string(),
                timeout_secs: 30,
                rate_limit_per_minute: 120,
            },
        }
    }
}
