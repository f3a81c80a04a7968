//! API Key Management Handlers
//!
//! Signed-in users manage their own keys. Keys owned by someone else are
//! reported as not found.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{require_name, signed_in};
use crate::api::error::ApiError;
use crate::api::response;
use crate::db::{generate_key_value, ApiKey, ApiKeyPatch, NewApiKey};
use crate::domain::{Plan, Principal, RequestContext, UsageSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub daily_limit: Option<i32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    pub keys: Vec<ApiKey>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CurrentKeyResponse {
    pub key: ApiKey,
    pub usage: UsageSnapshot,
}

/// Daily limit for a new key: the plan default, or a lower explicit value.
/// Admins may set any positive limit.
fn effective_daily_limit(requested: Option<i32>, plan: Plan, plan_default: i32) -> Result<i32, ApiError> {
    match requested {
        None => Ok(plan_default),
        Some(limit) if limit <= 0 => Err(ApiError::Validation("daily_limit must be positive".to_string())),
        Some(limit) if plan == Plan::Admin => Ok(limit),
        Some(limit) => Ok(limit.min(plan_default)),
    }
}

async fn owned_key(state: &AppState, principal: &Principal, id: Uuid) -> Result<ApiKey, ApiError> {
    state
        .store
        .find_api_key_by_id(id)
        .await?
        .filter(|key| key.user_id == principal.id)
        .ok_or(ApiError::NotFound("API key"))
}

/// GET /api/v1/keys
pub async fn list_keys(state: web::Data<AppState>, ctx: RequestContext) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let keys = state.store.list_api_keys(principal.id).await?;
    let count = keys.len();
    Ok(response::ok("API keys retrieved", ListKeysResponse { keys, count }))
}

/// POST /api/v1/keys
pub async fn create_key(
    state: web::Data<AppState>,
    ctx: RequestContext,
    body: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let body = body.into_inner();
    let name = require_name(&body.name, "name")?;
    if matches!(body.expires_at, Some(at) if at <= Utc::now()) {
        return Err(ApiError::Validation("expires_at must be in the future".to_string()));
    }
    let daily_limit = effective_daily_limit(
        body.daily_limit,
        principal.plan,
        state.settings.plans.daily_limit(principal.plan),
    )?;

    let key = state
        .store
        .create_api_key(NewApiKey {
            user_id: principal.id,
            key_value: generate_key_value(),
            name,
            daily_limit,
            expires_at: body.expires_at,
        })
        .await?;

    info!(key_id = %key.id, user_id = %principal.id, daily_limit, "API key created");
    Ok(response::created("API key created", key))
}

/// PATCH /api/v1/keys/{id}
pub async fn update_key(
    state: web::Data<AppState>,
    ctx: RequestContext,
    path: web::Path<Uuid>,
    body: web::Json<UpdateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let key = owned_key(&state, principal, path.into_inner()).await?;
    let body = body.into_inner();

    let patch = ApiKeyPatch {
        name: body.name.map(|n| require_name(&n, "name")).transpose()?,
        is_active: body.is_active,
        ..Default::default()
    };
    let updated = state
        .store
        .update_api_key(key.id, patch)
        .await?
        .ok_or(ApiError::NotFound("API key"))?;
    Ok(response::ok("API key updated", updated))
}

/// POST /api/v1/keys/{id}/regenerate - New secret; the old one stops working
pub async fn regenerate_key(
    state: web::Data<AppState>,
    ctx: RequestContext,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let key = owned_key(&state, principal, path.into_inner()).await?;

    let patch = ApiKeyPatch {
        key_value: Some(generate_key_value()),
        ..Default::default()
    };
    let updated = state
        .store
        .update_api_key(key.id, patch)
        .await?
        .ok_or(ApiError::NotFound("API key"))?;
    Ok(response::ok("API key regenerated", updated))
}

/// DELETE /api/v1/keys/{id}
pub async fn delete_key(
    state: web::Data<AppState>,
    ctx: RequestContext,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let key = owned_key(&state, principal, path.into_inner()).await?;

    if !state.store.delete_api_key(key.id).await? {
        return Err(ApiError::NotFound("API key"));
    }
    info!(key_id = %key.id, user_id = %principal.id, "API key deleted");
    Ok(response::message("API key deleted"))
}

/// GET /api/v1/keys/current - The key this request was admitted with
pub async fn current_key(state: web::Data<AppState>, ctx: RequestContext) -> Result<HttpResponse, ApiError> {
    let (Some(key_ctx), Some(usage)) = (ctx.key.as_ref(), ctx.usage) else {
        return Err(ApiError::Internal("API key context missing".to_string()));
    };
    let key = state
        .store
        .find_api_key_by_id(key_ctx.key_id)
        .await?
        .ok_or(ApiError::NotFound("API key"))?;
    Ok(response::ok("API key retrieved", CurrentKeyResponse { key, usage }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use serde_json::json;

    use crate::api;
    use crate::api::handlers::test_support::{read_json, register_request, set_plan, settings, state_with};

    // `test` here is actix_web::test, so the attribute is spelled out
    #[actix_web::test]
    async fn test_explicit_limit_is_capped_for_non_admins() {
        assert_eq!(effective_daily_limit(None, Plan::Free, 100).unwrap(), 100);
        assert_eq!(effective_daily_limit(Some(5_000), Plan::Free, 100).unwrap(), 100);
        assert_eq!(effective_daily_limit(Some(10), Plan::Free, 100).unwrap(), 10);
        assert_eq!(effective_daily_limit(Some(5_000_000), Plan::Admin, 1_000_000).unwrap(), 5_000_000);
        assert!(effective_daily_limit(Some(0), Plan::Pro, 10_000).is_err());
    }

    #[actix_web::test]
    async fn test_key_lifecycle() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        let resp = test::call_service(&app, register_request("keys@example.com").to_request()).await;
        let data = read_json(resp).await["data"].clone();
        let bearer = format!("Bearer {}", data["token"].as_str().unwrap());

        let req = test::TestRequest::post()
            .uri("/api/v1/keys")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({ "name": "ci", "daily_limit": 10 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let created = read_json(resp).await["data"].clone();
        assert_eq!(created["daily_limit"], 10);
        let id = created["id"].as_str().unwrap().to_string();
        let old_value = created["key_value"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/v1/keys")
            .insert_header(("Authorization", bearer.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(read_json(resp).await["data"]["count"], 2);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/keys/{id}/regenerate"))
            .insert_header(("Authorization", bearer.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let new_value = read_json(resp).await["data"]["key_value"].as_str().unwrap().to_string();
        assert_ne!(new_value, old_value);

        let req = test::TestRequest::get()
            .uri("/api/v1/keys/current")
            .insert_header(("X-API-Key", old_value.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(read_json(resp).await["code"], "INVALID_API_KEY");

        let req = test::TestRequest::patch()
            .uri(&format!("/api/v1/keys/{id}"))
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({ "is_active": false }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let req = test::TestRequest::get()
            .uri("/api/v1/keys/current")
            .insert_header(("X-API-Key", new_value.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(read_json(resp).await["code"], "API_KEY_DEACTIVATED");

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/keys/{id}"))
            .insert_header(("Authorization", bearer.as_str()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    #[actix_web::test]
    async fn test_other_users_keys_are_not_found() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        let resp = test::call_service(&app, register_request("alice@example.com").to_request()).await;
        let alice = read_json(resp).await["data"].clone();
        let resp = test::call_service(&app, register_request("bob@example.com").to_request()).await;
        let bob = read_json(resp).await["data"].clone();

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/keys/{}", alice["api_key"]["id"].as_str().unwrap()))
            .insert_header(("Authorization", format!("Bearer {}", bob["token"].as_str().unwrap())))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(read_json(resp).await["code"], "NOT_FOUND");
    }

    #[actix_web::test]
    async fn test_eleventh_request_is_rejected_with_quota_payload() {
        let (state, store) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        let resp = test::call_service(&app, register_request("quota@example.com").to_request()).await;
        let data = read_json(resp).await["data"].clone();
        let bearer = format!("Bearer {}", data["token"].as_str().unwrap());

        let req = test::TestRequest::post()
            .uri("/api/v1/keys")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({ "name": "ten", "daily_limit": 10 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let key = read_json(resp).await["data"]["key_value"].as_str().unwrap().to_string();

        for expected in (0..10).rev() {
            let req = test::TestRequest::get()
                .uri("/api/v1/keys/current")
                .insert_header(("X-API-Key", key.as_str()))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 200);
            assert_eq!(
                resp.headers().get("X-Quota-Remaining").unwrap().to_str().unwrap(),
                expected.to_string()
            );
        }

        let req = test::TestRequest::get()
            .uri("/api/v1/keys/current")
            .insert_header(("X-API-Key", key.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 429);
        let body = read_json(resp).await;
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["data"], json!({ "limit": 10, "used": 10, "remaining": 0 }));

        // Admins are not capped by the plan default
        set_plan(&store, data["user"]["id"].as_str().unwrap(), Plan::Admin).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/keys")
            .insert_header(("Authorization", bearer.as_str()))
            .set_json(json!({ "name": "big", "daily_limit": 5_000_000 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(read_json(resp).await["data"]["daily_limit"], 5_000_000);
    }
}
