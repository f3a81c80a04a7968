//! OpenAPI 3.0 specification definition

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::handlers::{
    auth::{AuthResponse, LoginRequest, RegisterRequest},
    health::HealthResponse,
    usage::{KeyUsage, UsageReport, UsageTotals},
};
use crate::db::{ApiKey as ApiKeyRecord, DailyUsage};
use crate::domain::{Plan, PlanInfo, Principal, UsageSnapshot};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keygate API",
        version = "1.0.0",
        description = "API gateway with API-key authentication, daily quotas and usage accounting",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "plans", description = "Subscription plans"),
        (name = "auth", description = "Account registration and sessions"),
        (name = "usage", description = "Usage dashboard")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::plans::list_plans,
        crate::api::handlers::auth::register,
        crate::api::handlers::auth::login,
        crate::api::handlers::usage::get_usage,
    ),
    components(
        schemas(
            HealthResponse,
            Plan,
            PlanInfo,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            Principal,
            ApiKeyRecord,
            UsageSnapshot,
            DailyUsage,
            KeyUsage,
            UsageTotals,
            UsageReport,
        )
    ),
    modifiers(&SecuritySchemes)
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}
