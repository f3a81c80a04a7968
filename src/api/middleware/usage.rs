//! Request facts for usage records and quota response headers

use actix_web::dev::ServiceRequest;
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::IpAddr;

use crate::domain::{RequestMeta, UsageSnapshot};

/// Quota headers on API-key routes
pub const QUOTA_LIMIT: &str = "x-quota-limit";
pub const QUOTA_USED: &str = "x-quota-used";
pub const QUOTA_REMAINING: &str = "x-quota-remaining";

/// Caller IP used for usage rows and the IP rate-limit window.
///
/// The socket peer address unless `trust_forwarded` is set, in which case the
/// first `X-Forwarded-For` entry, then `X-Real-IP`, win over it.
pub fn extract_client_ip(req: &ServiceRequest, trust_forwarded: bool) -> Option<String> {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(req) {
            return Some(ip.to_string());
        }
    }
    req.peer_addr().map(|addr| addr.ip().to_string())
}

fn forwarded_ip(req: &ServiceRequest) -> Option<IpAddr> {
    // X-Forwarded-For may contain multiple IPs, the first is the client
    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        req.headers()
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    })
}

/// Extract user agent from request
pub fn extract_user_agent(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("User-Agent")
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.chars().take(500).collect())
}

pub fn request_meta(req: &ServiceRequest, trust_forwarded: bool) -> RequestMeta {
    RequestMeta {
        endpoint: req.path().to_string(),
        method: req.method().to_string(),
        client_ip: extract_client_ip(req, trust_forwarded),
        user_agent: extract_user_agent(req),
    }
}

pub fn insert_quota_headers(headers: &mut HeaderMap, usage: &UsageSnapshot) {
    for (name, value) in [
        (QUOTA_LIMIT, usage.limit),
        (QUOTA_USED, usage.used),
        (QUOTA_REMAINING, usage.remaining),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
}
