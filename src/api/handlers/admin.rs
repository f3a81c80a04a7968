//! Admin endpoints

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access::require_admin;
use crate::api::error::ApiError;
use crate::api::response;
use crate::db::UserPatch;
use crate::domain::{Plan, Principal, RequestContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: Plan,
    /// Also reset every key of the user to the new plan's default limit
    #[serde(default)]
    pub apply_to_keys: bool,
}

#[derive(Debug, Serialize)]
pub struct ChangePlanResponse {
    pub user: Principal,
    pub keys_updated: u64,
}

/// PATCH /api/v1/admin/users/{id}/plan
pub async fn change_user_plan(
    state: web::Data<AppState>,
    ctx: RequestContext,
    path: web::Path<Uuid>,
    body: web::Json<ChangePlanRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(ctx.principal.as_ref())?;
    let user_id = path.into_inner();
    let body = body.into_inner();

    let user = state
        .store
        .update_user(user_id, UserPatch { plan: Some(body.plan), ..Default::default() })
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let keys_updated = if body.apply_to_keys {
        state
            .store
            .set_daily_limit_for_user(user.id, state.settings.plans.daily_limit(body.plan))
            .await?
    } else {
        0
    };

    info!(user_id = %user.id, plan = %body.plan, keys_updated, "User plan changed");
    Ok(response::ok(
        "Plan updated",
        ChangePlanResponse { user: Principal::from(&user), keys_updated },
    ))
}

/// POST /api/v1/admin/sessions/cleanup
pub async fn cleanup_sessions(
    state: web::Data<AppState>,
    ctx: RequestContext,
) -> Result<HttpResponse, ApiError> {
    require_admin(ctx.principal.as_ref())?;
    let removed = state.store.cleanup_expired_sessions(Utc::now()).await?;
    info!(removed, "Expired sessions removed");
    Ok(response::ok("Expired sessions removed", serde_json::json!({ "removed": removed })))
}
