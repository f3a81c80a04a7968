//! Authentication middleware service
//!
//! Resolves the caller according to the scope's [`AuthMode`], stores one
//! [`RequestContext`] in the request extensions and, for API-key requests,
//! completes the usage row and adds quota headers once the response exists.
//! Rejected credentials are charged to the caller's IP window.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

use super::auth::{extract_api_key, extract_bearer_token};
use super::usage::{insert_quota_headers, request_meta};
use crate::access::{AccessError, ApiKeyAuthentication, Authenticator};
use crate::api::error::ApiError;
use crate::domain::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Signed-in user via bearer token
    Bearer,
    /// API key required; quota is consumed
    ApiKey,
    /// API key used when valid, anonymous otherwise
    OptionalApiKey,
}

/// Middleware factory for one auth mode
pub struct AuthGate {
    authenticator: Authenticator,
    mode: AuthMode,
    allow_query_api_key: bool,
    trust_forwarded: bool,
}

impl AuthGate {
    pub fn new(
        authenticator: Authenticator,
        mode: AuthMode,
        allow_query_api_key: bool,
        trust_forwarded: bool,
    ) -> Self {
        Self {
            authenticator,
            mode,
            allow_query_api_key,
            trust_forwarded,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = AuthGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthGateService {
            service: Rc::new(service),
            authenticator: self.authenticator.clone(),
            mode: self.mode,
            allow_query_api_key: self.allow_query_api_key,
            trust_forwarded: self.trust_forwarded,
        })
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
    authenticator: Authenticator,
    mode: AuthMode,
    allow_query_api_key: bool,
    trust_forwarded: bool,
}

fn reject<B>(req: ServiceRequest, err: AccessError) -> ServiceResponse<EitherBody<B, BoxBody>> {
    let response = ApiError::from(err).error_response();
    req.into_response(response).map_into_right_body()
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
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
        let authenticator = self.authenticator.clone();
        let mode = self.mode;
        let allow_query = self.allow_query_api_key;
        let trust_forwarded = self.trust_forwarded;

        Box::pin(async move {
            let meta = request_meta(&req, trust_forwarded);

            let admitted: ApiKeyAuthentication = match mode {
                AuthMode::Bearer => {
                    let token = extract_bearer_token(&req);
                    match authenticator.authenticate_bearer(token.as_deref()).await {
                        Ok(principal) => {
                            req.extensions_mut()
                                .insert(RequestContext::for_user(principal, meta.client_ip));
                            return Ok(service.call(req).await?.map_into_left_body());
                        }
                        Err(e) => {
                            let e = authenticator.charge_rejection(e, meta.client_ip.as_deref());
                            return Ok(reject(req, e));
                        }
                    }
                }
                AuthMode::ApiKey => {
                    let key = extract_api_key(&req, allow_query);
                    match authenticator.authenticate_api_key(key.as_deref(), &meta).await {
                        Ok(admitted) => admitted,
                        Err(e) => {
                            let e = authenticator.charge_rejection(e, meta.client_ip.as_deref());
                            return Ok(reject(req, e));
                        }
                    }
                }
                AuthMode::OptionalApiKey => {
                    let key = extract_api_key(&req, allow_query);
                    match authenticator.authenticate_api_key_optional(key.as_deref(), &meta).await {
                        Some(admitted) => admitted,
                        None => {
                            req.extensions_mut()
                                .insert(RequestContext::anonymous(meta.client_ip));
                            return Ok(service.call(req).await?.map_into_left_body());
                        }
                    }
                }
            };

            let ApiKeyAuthentication { principal, key, usage, entry } = admitted;
            req.extensions_mut()
                .insert(RequestContext::for_api_key(principal, key, usage, meta.client_ip));

            let start = Instant::now();
            let recorder = authenticator.recorder().clone();
            match service.call(req).await {
                Ok(res) => {
                    recorder.finalize(entry, res.status().as_u16(), start.elapsed());
                    let mut res = res.map_into_left_body();
                    insert_quota_headers(res.headers_mut(), &usage);
                    Ok(res)
                }
                Err(e) => {
                    let status = e.as_response_error().status_code();
                    recorder.finalize(entry, status.as_u16(), start.elapsed());
                    Err(e)
                }
            }
        })
    }
}
