//! API module - HTTP routes and handlers

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod response;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::error::ApiError;
use crate::api::middleware::{AuthGate, AuthMode, RateLimitGate};
use crate::api::openapi::ApiDoc;
use crate::AppState;

fn ip_limit(state: &AppState) -> RateLimitGate {
    RateLimitGate::new(
        state.limiter.clone(),
        state.settings.rate_limit.clone(),
        state.settings.server.trust_forwarded_for,
    )
}

fn auth(state: &AppState, mode: AuthMode) -> AuthGate {
    AuthGate::new(
        state.authenticator.clone(),
        mode,
        state.settings.auth.allow_query_api_key,
        state.settings.server.trust_forwarded_for,
    )
}

/// Configure all API routes
///
/// Gates are attached per scope or resource; the gate wrapped last runs
/// first, so authentication always precedes the caller-IP limiter. Failed
/// authentication is charged to the same IP window by the auth gate itself.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &web::Data<AppState>) {
    cfg.app_data(state.clone())
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            ApiError::Validation(err.to_string()).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            ApiError::Validation(err.to_string()).into()
        }))
        .app_data(web::PathConfig::default().error_handler(|err, _req| {
            ApiError::Validation(err.to_string()).into()
        }))
        .route("/health", web::get().to(handlers::health::health_check))
        .service(
            web::scope("/api/v1")
                .service(
                    web::resource("/plans")
                        .wrap(ip_limit(state))
                        .route(web::get().to(handlers::plans::list_plans)),
                )
                .service(
                    web::scope("/auth")
                        .service(
                            web::resource("/register")
                                .wrap(ip_limit(state))
                                .route(web::post().to(handlers::auth::register)),
                        )
                        .service(
                            web::resource("/login")
                                .wrap(ip_limit(state))
                                .route(web::post().to(handlers::auth::login)),
                        )
                        .service(
                            web::resource("/logout")
                                .wrap(ip_limit(state))
                                .wrap(auth(state, AuthMode::Bearer))
                                .route(web::post().to(handlers::auth::logout)),
                        )
                        .service(
                            web::resource("/me")
                                .wrap(ip_limit(state))
                                .wrap(auth(state, AuthMode::Bearer))
                                .route(web::get().to(handlers::auth::get_profile))
                                .route(web::patch().to(handlers::auth::update_profile))
                                .route(web::delete().to(handlers::auth::delete_account)),
                        ),
                )
                // Must precede the /keys scope, which would otherwise claim it
                .service(
                    web::resource("/keys/current")
                        .wrap(auth(state, AuthMode::ApiKey))
                        .route(web::get().to(handlers::keys::current_key)),
                )
                .service(
                    web::scope("/keys")
                        .wrap(ip_limit(state))
                        .wrap(auth(state, AuthMode::Bearer))
                        .route("", web::get().to(handlers::keys::list_keys))
                        .route("", web::post().to(handlers::keys::create_key))
                        .route("/{id}", web::patch().to(handlers::keys::update_key))
                        .route("/{id}", web::delete().to(handlers::keys::delete_key))
                        .route("/{id}/regenerate", web::post().to(handlers::keys::regenerate_key)),
                )
                .service(
                    web::scope("/usage")
                        .wrap(ip_limit(state))
                        .wrap(auth(state, AuthMode::Bearer))
                        .route("", web::get().to(handlers::usage::get_usage)),
                )
                .service(
                    web::scope("/admin")
                        .wrap(ip_limit(state))
                        .wrap(auth(state, AuthMode::Bearer))
                        .route("/users/{id}/plan", web::patch().to(handlers::admin::change_user_plan))
                        .route("/sessions/cleanup", web::post().to(handlers::admin::cleanup_sessions)),
                )
                .service(
                    web::scope("/ai")
                        .wrap(auth(state, AuthMode::ApiKey))
                        .route("/chat", web::get().to(handlers::proxy::ai_chat))
                        .route("/image", web::get().to(handlers::proxy::ai_image)),
                )
                .service(
                    web::resource("/download/{platform}")
                        .wrap(ip_limit(state))
                        .wrap(auth(state, AuthMode::OptionalApiKey))
                        .route(web::get().to(handlers::proxy::download)),
                ),
        )
        // Swagger UI and OpenAPI spec
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        );
}
