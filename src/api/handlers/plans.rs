//! Plan catalogue

use actix_web::{web, HttpResponse};

use crate::api::response;
use crate::domain::{Plan, PlanInfo};
use crate::AppState;

/// GET /api/v1/plans - Plans with their configured daily limits
#[utoipa::path(
    get,
    path = "/api/v1/plans",
    tag = "plans",
    responses(
        (status = 200, description = "Available plans", body = [PlanInfo])
    )
)]
pub async fn list_plans(state: web::Data<AppState>) -> HttpResponse {
    let plans: Vec<PlanInfo> = Plan::ALL
        .iter()
        .filter(|p| **p != Plan::Admin)
        .map(|p| p.info(&state.settings.plans))
        .collect();
    response::ok("Plans retrieved", plans)
}

#[cfg(test)]
mod tests {
    use actix_web::{test, App};

    use crate::api;
    use crate::api::handlers::test_support::{read_json, settings, state_with};

    #[actix_web::test]
    async fn test_plans_are_public_and_configurable() {
        let mut settings = settings();
        settings.plans.basic_daily_limit = 2_500;
        let (state, _) = state_with(settings);
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/plans").to_request()).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-ratelimit-remaining"));

        let body = read_json(resp).await;
        let plans = body["data"].as_array().unwrap();
        assert_eq!(plans.len(), 4);
        assert_eq!(plans[1]["name"], "basic");
        assert_eq!(plans[1]["daily_limit"], 2_500);
        assert_eq!(plans[1]["price_cents"], 999);
    }

    #[actix_web::test]
    async fn test_rotating_forwarded_for_keeps_one_window() {
        let mut settings = settings();
        settings.rate_limit.max_requests = 2;
        let (state, _) = state_with(settings);
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        let mut statuses = Vec::new();
        for i in 0..4 {
            let req = test::TestRequest::get()
                .uri("/api/v1/plans")
                .peer_addr("192.0.2.50:5000".parse().unwrap())
                .insert_header(("X-Forwarded-For", format!("10.0.0.{i}")))
                .to_request();
            statuses.push(test::call_service(&app, req).await.status().as_u16());
        }
        assert_eq!(statuses, [200, 200, 429, 429]);
    }

    #[actix_web::test]
    async fn test_forwarded_for_is_honoured_when_trusted() {
        let mut settings = settings();
        settings.rate_limit.max_requests = 1;
        settings.server.trust_forwarded_for = true;
        let (state, _) = state_with(settings);
        let app = test::init_service(App::new().configure(|cfg| api::configure_routes(cfg, &state))).await;

        for client in ["203.0.113.1", "203.0.113.2"] {
            let req = test::TestRequest::get()
                .uri("/api/v1/plans")
                .peer_addr("192.0.2.50:5000".parse().unwrap())
                .insert_header(("X-Forwarded-For", client))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 200);
        }
    }
}
