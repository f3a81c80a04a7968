//! Success envelopes: `{status: true, message, data?}`

use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::{json, Value};

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(envelope(message, data))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(envelope(message, data))
}

pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": true, "message": message }))
}

fn envelope<T: Serialize>(message: &str, data: T) -> Value {
    json!({
        "status": true,
        "message": message,
        "data": data,
    })
}
