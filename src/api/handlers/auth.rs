//! Account endpoints: registration, login, logout and profile

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{normalize_email, require_name, signed_in};
use crate::access::{hash_password, verify_password, AccessError};
use crate::api::error::ApiError;
use crate::api::middleware::extract_session_id;
use crate::api::response;
use crate::db::{generate_key_value, ApiKey, DbError, NewApiKey, NewSession, NewUser, User, UserPatch};
use crate::domain::{Plan, Principal, RequestContext};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: Principal,
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub session_id: String,
    /// Only returned at registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn hash_off_thread(password: String) -> Result<String, ApiError> {
    web::block(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Token plus a fresh audit session for `user`
async fn start_session(
    state: &AppState,
    req: &HttpRequest,
    user: &User,
) -> Result<(String, String), ApiError> {
    let token = state
        .jwt
        .issue(user.id, &user.email, user.plan)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let session = state
        .store
        .create_session(NewSession {
            id: new_session_id(),
            user_id: user.id,
            ip_address: req.connection_info().realip_remote_addr().map(str::to_string),
            user_agent: req
                .headers()
                .get("User-Agent")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.chars().take(500).collect()),
            expires_at: Utc::now() + Duration::seconds(state.jwt.ttl_secs()),
        })
        .await?;

    Ok((token, session.id))
}

/// POST /api/v1/auth/register
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let email = normalize_email(&body.email)?;
    let full_name = require_name(&body.full_name, "full_name")?;
    if body.password.chars().count() < state.settings.auth.password_min_length {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            state.settings.auth.password_min_length
        )));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::EmailExists);
    }

    let password_hash = hash_off_thread(body.password).await?;
    let user = match state
        .store
        .create_user(NewUser {
            email,
            password_hash,
            full_name,
            plan: Plan::Free,
        })
        .await
    {
        Ok(user) => user,
        // Lost a race with a concurrent registration
        Err(DbError::Conflict(_)) => return Err(ApiError::EmailExists),
        Err(e) => return Err(e.into()),
    };

    let api_key = state
        .store
        .create_api_key(NewApiKey {
            user_id: user.id,
            key_value: generate_key_value(),
            name: "Default".to_string(),
            daily_limit: state.settings.plans.daily_limit(user.plan),
            expires_at: None,
        })
        .await?;

    let (token, session_id) = start_session(&state, &req, &user).await?;
    info!(user_id = %user.id, key_id = %api_key.id, "User registered");

    Ok(response::created(
        "Registration successful",
        AuthResponse {
            user: Principal::from(&user),
            token,
            expires_in: state.jwt.ttl_secs(),
            session_id,
            api_key: Some(api_key),
        },
    ))
}

/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    )
)]
pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let email = body.email.trim().to_lowercase();

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        return Err(ApiError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let matches = web::block(move || verify_password(&body.password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("stored password hash unreadable: {e}")))?;
    if !matches {
        warn!(user_id = %user.id, "Failed login");
        return Err(ApiError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AccessError::AccountDeactivated.into());
    }

    let (token, session_id) = start_session(&state, &req, &user).await?;
    info!(user_id = %user.id, "User logged in");

    Ok(response::ok(
        "Login successful",
        AuthResponse {
            user: Principal::from(&user),
            token,
            expires_in: state.jwt.ttl_secs(),
            session_id,
            api_key: None,
        },
    ))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    state: web::Data<AppState>,
    req: HttpRequest,
    ctx: RequestContext,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    if let Some(session_id) = extract_session_id(&req) {
        let removed = state.store.delete_session(&session_id, principal.id).await?;
        if !removed {
            warn!(user_id = %principal.id, "Logout for unknown session");
        }
    }
    Ok(response::message("Logged out"))
}

/// GET /api/v1/auth/me
pub async fn get_profile(ctx: RequestContext) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    Ok(response::ok("Profile retrieved", principal))
}

/// PATCH /api/v1/auth/me
pub async fn update_profile(
    state: web::Data<AppState>,
    ctx: RequestContext,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let full_name = body
        .into_inner()
        .full_name
        .map(|n| require_name(&n, "full_name"))
        .transpose()?;

    let user = state
        .store
        .update_user(principal.id, UserPatch { full_name, ..Default::default() })
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(response::ok("Profile updated", Principal::from(&user)))
}

/// DELETE /api/v1/auth/me - Deactivates the account; its keys stop working
pub async fn delete_account(
    state: web::Data<AppState>,
    ctx: RequestContext,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    state
        .store
        .update_user(principal.id, UserPatch { is_active: Some(false), ..Default::default() })
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    info!(user_id = %principal.id, "Account deactivated");
    Ok(response::message("Account deactivated"))
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};
    use serde_json::json;

    use crate::api;
    use crate::api::handlers::test_support::{read_json, register_request, settings, state_with};

    #[actix_web::test]
    async fn test_register_returns_working_credentials() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        let resp = test::call_service(&app, register_request(" New@Example.com ").to_request()).await;
        assert_eq!(resp.status(), 201);
        let data = read_json(resp).await["data"].clone();
        assert_eq!(data["user"]["email"], "new@example.com");
        assert_eq!(data["user"]["plan"], "free");
        assert_eq!(data["api_key"]["daily_limit"], 100);
        assert_eq!(data["api_key"]["name"], "Default");
        assert!(data["user"].get("password_hash").is_none());

        // Bearer token works at once
        let token = data["token"].as_str().unwrap();
        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        // So does the default key
        let key = data["api_key"]["key_value"].as_str().unwrap();
        assert!(key.starts_with("sk-"));
        let req = test::TestRequest::get()
            .uri("/api/v1/keys/current")
            .insert_header(("X-API-Key", key))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get("X-Quota-Remaining").unwrap(), "99");
    }

    #[actix_web::test]
    async fn test_duplicate_and_invalid_registration() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        test::call_service(&app, register_request("dup@example.com").to_request()).await;
        let resp = test::call_service(&app, register_request("DUP@example.com").to_request()).await;
        assert_eq!(resp.status(), 409);
        assert_eq!(read_json(resp).await["code"], "EMAIL_EXISTS");

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(json!({ "email": "short@example.com", "password": "abc", "full_name": "S" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(read_json(resp).await["code"], "VALIDATION_ERROR");

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(json!({ "email": "missing-fields@example.com" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_login_and_logout() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        test::call_service(&app, register_request("login@example.com").to_request()).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({ "email": "login@example.com", "password": "wrong-password" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(read_json(resp).await["code"], "INVALID_CREDENTIALS");

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({ "email": "LOGIN@example.com", "password": "correct-horse-battery" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let data = read_json(resp).await["data"].clone();
        let token = data["token"].as_str().unwrap().to_string();
        let session = data["session_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/logout")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .insert_header(("X-Session-Id", session))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_deactivated_account_is_locked_out() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        let resp = test::call_service(&app, register_request("gone@example.com").to_request()).await;
        let data = read_json(resp).await["data"].clone();
        let token = data["token"].as_str().unwrap().to_string();
        let key = data["api_key"]["key_value"].as_str().unwrap().to_string();

        let req = test::TestRequest::delete()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
        assert_eq!(read_json(resp).await["code"], "ACCOUNT_DEACTIVATED");

        let req = test::TestRequest::get()
            .uri("/api/v1/ai/chat?prompt=hi")
            .insert_header(("X-API-Key", key))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(read_json(resp).await["code"], "USER_INACTIVE");

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({ "email": "gone@example.com", "password": "correct-horse-battery" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn test_me_requires_token() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/auth/me").to_request()).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(read_json(resp).await["code"], "TOKEN_REQUIRED");

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", "Bearer not.a.jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(read_json(resp).await["code"], "INVALID_TOKEN");
    }
}
