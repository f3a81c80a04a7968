//! Credential extraction and the request context extractor
//!
//! API keys are read from the X-API-Key header, then Authorization: Bearer,
//! then (if enabled) the `api_key` query parameter.

use actix_web::dev::{Payload, ServiceRequest};
use actix_web::http::header::Header;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{ready, Ready};

use crate::domain::RequestContext;

/// Header name for API key
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Header naming the session to end on logout
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Token from `Authorization: Bearer <token>`
pub fn extract_bearer_token<T: HttpMessage>(req: &T) -> Option<String> {
    Authorization::<Bearer>::parse(req)
        .ok()
        .map(|auth| auth.into_scheme().token().to_string())
}

/// Extract API key from request headers, falling back to the query string
pub fn extract_api_key(req: &ServiceRequest, allow_query: bool) -> Option<String> {
    if let Some(key) = req.headers().get(API_KEY_HEADER) {
        if let Ok(key_str) = key.to_str() {
            if !key_str.trim().is_empty() {
                return Some(key_str.trim().to_string());
            }
        }
    }

    if let Some(token) = extract_bearer_token(req) {
        return Some(token);
    }

    if allow_query {
        return url::form_urlencoded::parse(req.query_string().as_bytes())
            .find(|(name, value)| name == "api_key" && !value.is_empty())
            .map(|(_, value)| value.into_owned());
    }

    None
}

pub fn extract_session_id(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Handlers take the context by value; routes without an auth gate see an
/// anonymous one.
impl FromRequest for RequestContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| {
                let ip = req.peer_addr().map(|addr| addr.ip().to_string());
                RequestContext::anonymous(ip)
            });
        ready(Ok(ctx))
    }
}
