//! Proxied AI and downloader endpoints
//!
//! These run only after admission. Upstream failures still answer 200, with
//! `data.fallback = true` and a placeholder result.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::access::require_plan;
use crate::api::error::ApiError;
use crate::api::response;
use crate::domain::{RequestContext, PAID_PLANS};
use crate::providers::{Platform, UpstreamReply};
use crate::AppState;

const MAX_PROMPT_CHARS: usize = 4_000;

#[derive(Debug, Deserialize)]
pub struct PromptQuery {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: String,
}

fn valid_prompt(raw: &str) -> Result<&str, ApiError> {
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(ApiError::Validation("prompt is required".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::Validation(format!(
            "prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(prompt)
}

fn proxied(message: &str, reply: UpstreamReply, ctx: &RequestContext) -> HttpResponse {
    response::ok(
        message,
        json!({
            "result": reply.body,
            "fallback": reply.fallback,
            "usage": ctx.usage,
        }),
    )
}

/// GET /api/v1/ai/chat?prompt=
pub async fn ai_chat(
    state: web::Data<AppState>,
    ctx: RequestContext,
    query: web::Query<PromptQuery>,
) -> Result<HttpResponse, ApiError> {
    let prompt = valid_prompt(&query.prompt)?;
    let reply = state.ai.chat(prompt).await;
    Ok(proxied("AI response", reply, &ctx))
}

/// GET /api/v1/ai/image?prompt= - Paid plans only
pub async fn ai_image(
    state: web::Data<AppState>,
    ctx: RequestContext,
    query: web::Query<PromptQuery>,
) -> Result<HttpResponse, ApiError> {
    require_plan(ctx.principal.as_ref(), PAID_PLANS)?;
    let prompt = valid_prompt(&query.prompt)?;
    let reply = state.ai.image(prompt).await;
    Ok(proxied("Image generated", reply, &ctx))
}

/// GET /api/v1/download/{platform}?url=
pub async fn download(
    state: web::Data<AppState>,
    ctx: RequestContext,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> Result<HttpResponse, ApiError> {
    let platform: Platform = path.into_inner().parse()?;
    let media_url = platform.validate_url(&query.url)?;
    let reply = state.downloader.download(platform, &media_url).await;
    Ok(proxied("Download links retrieved", reply, &ctx))
}
