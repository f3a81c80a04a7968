//! Usage Statistics Handlers
//!
//! Per-key counters for today plus daily aggregates from the usage log.

use actix_web::{web, HttpResponse};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::signed_in;
use crate::api::error::ApiError;
use crate::api::response;
use crate::db::DailyUsage;
use crate::domain::RequestContext;
use crate::AppState;

const DEFAULT_DAYS: i64 = 7;
const MAX_DAYS: i64 = 90;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KeyUsage {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub daily_limit: i32,
    pub requests_today: i32,
    pub remaining_today: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageTotals {
    pub requests: i64,
    pub errors: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageReport {
    pub days: i64,
    pub since: NaiveDate,
    pub keys: Vec<KeyUsage>,
    pub daily: Vec<DailyUsage>,
    pub totals: UsageTotals,
}

/// GET /api/v1/usage?days=N
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "usage",
    params(("days" = Option<i64>, Query, description = "Days of history, 1-90 (default 7)")),
    responses(
        (status = 200, description = "Usage report", body = UsageReport),
        (status = 400, description = "days out of range")
    ),
    security(("bearer" = []))
)]
pub async fn get_usage(
    state: web::Data<AppState>,
    ctx: RequestContext,
    query: web::Query<UsageQuery>,
) -> Result<HttpResponse, ApiError> {
    let principal = signed_in(&ctx)?;
    let days = query.days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ApiError::Validation(format!("days must be between 1 and {MAX_DAYS}")));
    }

    let today = Utc::now().date_naive();
    let since = today - Duration::days(days - 1);

    let keys = state
        .store
        .list_api_keys(principal.id)
        .await?
        .into_iter()
        .map(|key| {
            let used = key.used_on(today);
            KeyUsage {
                id: key.id,
                name: key.name,
                is_active: key.is_active,
                daily_limit: key.daily_limit,
                requests_today: used,
                remaining_today: (key.daily_limit - used).max(0),
            }
        })
        .collect();

    let daily = state.store.daily_usage(principal.id, since).await?;
    let totals = UsageTotals {
        requests: daily.iter().map(|d| d.requests).sum(),
        errors: daily.iter().map(|d| d.errors).sum(),
    };

    Ok(response::ok(
        "Usage retrieved",
        UsageReport { days, since, keys, daily, totals },
    ))
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};
    use std::time::Duration;

    use crate::api;
    use crate::api::handlers::test_support::{read_json, register_request, settings, state_with};

    #[actix_web::test]
    async fn test_usage_reflects_admitted_requests() {
        let (state, store) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        let resp = test::call_service(&app, register_request("usage@example.com").to_request()).await;
        let data = read_json(resp).await["data"].clone();
        let bearer = format!("Bearer {}", data["token"].as_str().unwrap());
        let key = data["api_key"]["key_value"].as_str().unwrap().to_string();

        for _ in 0..3 {
            let req = test::TestRequest::get()
                .uri("/api/v1/keys/current")
                .insert_header(("X-API-Key", key.as_str()))
                .to_request();
            test::call_service(&app, req).await;
        }
        // Usage rows are written in the background
        for _ in 0..100 {
            if store.usage_entries().iter().filter(|e| e.is_finalized()).count() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let req = test::TestRequest::get()
            .uri("/api/v1/usage?days=30")
            .insert_header(("Authorization", bearer.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let report = read_json(resp).await["data"].clone();
        assert_eq!(report["days"], 30);
        assert_eq!(report["keys"][0]["requests_today"], 3);
        assert_eq!(report["keys"][0]["remaining_today"], 97);
        assert_eq!(report["totals"]["requests"], 3);
        assert_eq!(report["totals"]["errors"], 0);
    }

    #[actix_web::test]
    async fn test_days_out_of_range() {
        let (state, _) = state_with(settings());
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;
        let resp = test::call_service(&app, register_request("range@example.com").to_request()).await;
        let token = read_json(resp).await["data"]["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/v1/usage?days=91")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(read_json(resp).await["code"], "VALIDATION_ERROR");
    }
}
