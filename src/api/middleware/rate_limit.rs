//! Caller-IP rate limiting middleware
//!
//! Applies the sliding window limiter keyed by `ip:<caller ip>` to requests
//! that were not admitted with an API key (keyed requests are limited per key
//! during authentication).

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage, ResponseError,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::usage::extract_client_ip;
use crate::access::{AccessError, SlidingWindowLimiter};
use crate::api::error::ApiError;
use crate::config::RateLimitSettings;
use crate::domain::RequestContext;

/// Rate limit headers
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

pub struct RateLimitGate {
    limiter: Arc<SlidingWindowLimiter>,
    settings: RateLimitSettings,
    trust_forwarded: bool,
}

impl RateLimitGate {
    pub fn new(
        limiter: Arc<SlidingWindowLimiter>,
        settings: RateLimitSettings,
        trust_forwarded: bool,
    ) -> Self {
        Self { limiter, settings, trust_forwarded }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = RateLimitGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitGateService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            settings: self.settings.clone(),
            trust_forwarded: self.trust_forwarded,
        })
    }
}

pub struct RateLimitGateService<S> {
    service: Rc<S>,
    limiter: Arc<SlidingWindowLimiter>,
    settings: RateLimitSettings,
    trust_forwarded: bool,
}

impl<S, B> Service<ServiceRequest> for RateLimitGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        let keyed = req
            .extensions()
            .get::<RequestContext>()
            .is_some_and(|ctx| ctx.key.is_some());
        if !self.settings.enabled || keyed {
            return Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) });
        }

        let ip = extract_client_ip(&req, self.trust_forwarded).unwrap_or_else(|| "unknown".to_string());
        let decision = self.limiter.check(
            &format!("ip:{ip}"),
            self.settings.max_requests,
            Duration::from_millis(self.settings.window_ms),
        );

        Box::pin(async move {
            if !decision.allowed {
                debug!(%ip, "Caller rate limit reached");
                let err = ApiError::from(AccessError::RateLimited {
                    limit: decision.limit,
                    retry_after_secs: decision.retry_after_secs(),
                });
                return Ok(req.into_response(err.error_response()).map_into_right_body());
            }

            let mut res = service.call(req).await?.map_into_left_body();
            let headers = res.headers_mut();
            headers.insert(HeaderName::from_static(RATE_LIMIT_LIMIT), HeaderValue::from(decision.limit));
            headers.insert(
                HeaderName::from_static(RATE_LIMIT_REMAINING),
                HeaderValue::from(decision.remaining),
            );
            Ok(res)
        })
    }
}
