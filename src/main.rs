//! Keygate
//!
//! REST API gateway that admits callers by API key or session token, enforces
//! per-key daily quotas and sliding-window rate limits, records every admitted
//! request, and proxies AI and media-download calls to upstream services.

use actix_web::{middleware, App, HttpServer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

mod access;
mod api;
mod config;
mod db;
mod domain;
mod providers;

use crate::access::{Authenticator, JwtKeys, SlidingWindowLimiter, UsageRecorder};
use crate::config::Settings;
use crate::db::{DbPool, MemoryStore, PgStore, Store};
use crate::providers::{AiClient, ProviderError, ProxyClient, SocialDownloader};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub jwt: JwtKeys,
    pub authenticator: Authenticator,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub ai: AiClient,
    pub downloader: SocialDownloader,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn Store>) -> Result<Self, ProviderError> {
        let jwt = JwtKeys::from_settings(&settings.auth);
        let limiter = Arc::new(SlidingWindowLimiter::new(settings.rate_limit.gc_probability));
        let authenticator = Authenticator::new(
            store.clone(),
            jwt.clone(),
            UsageRecorder::new(store.clone()),
            limiter.clone(),
            settings.rate_limit.clone(),
        );

        let proxy = ProxyClient::new(
            settings.proxy.rate_limit_per_minute,
            Duration::from_secs(settings.proxy.timeout_secs),
        )?;
        let ai = AiClient::new(
            proxy.clone(),
            &settings.proxy.ai_base_url,
            settings.proxy.ai_api_key.clone(),
        );
        let downloader = SocialDownloader::new(proxy, &settings.proxy.downloader_base_url);

        Ok(Self {
            settings,
            store,
            jwt,
            authenticator,
            limiter,
            ai,
            downloader,
            started_at: Instant::now(),
        })
    }
}

/// PostgreSQL when a database URL is configured, otherwise the in-memory store
async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    if settings.database.url.is_empty() {
        warn!("No database URL configured, using the in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = DbPool::new(&settings.database.url, settings.database.max_connections)?;
    pool.test_connection().await?;
    pool.run_migrations().await?;
    info!("Database pool initialized successfully");
    Ok(Arc::new(PgStore::new(pool)))
}

fn spawn_session_sweeper(store: Arc<dyn Store>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.cleanup_expired_sessions(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions removed"),
                Err(e) => error!(error = %e, "Session cleanup failed"),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("keygate=info,actix_web=info")),
        )
        .json()
        .init();

    let settings = Settings::load()?;
    api::error::expose_error_detail(!settings.is_production());
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Keygate v{} on {} ({})",
        env!("CARGO_PKG_VERSION"),
        bind_addr,
        settings.environment
    );

    let store = open_store(&settings).await?;
    if settings.auth.session_sweep_interval_secs > 0 {
        spawn_session_sweeper(
            store.clone(),
            Duration::from_secs(settings.auth.session_sweep_interval_secs),
        );
    }

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);
    let app_state = actix_web::web::Data::new(AppState::new(settings, store)?);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "keygate"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION"))),
            )
            .configure(|cfg| api::configure_routes(cfg, &app_state))
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
