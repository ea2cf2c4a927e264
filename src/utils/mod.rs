use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use serde_json::Value;

pub mod error_codes {
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CONFLICT: i32 = 1006;
    pub const METHOD_NOT_ALLOWED: i32 = 1007;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const TRANSPORT_ERROR: i32 = 5001;
    pub const UPSTREAM_ERROR: i32 = 5002;
}

/// Identity used when neither proxy headers nor the peer address are available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Caller identity for rate limiting.
///
/// Prefers the first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// socket peer address recorded by `into_make_service_with_connect_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()));
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        };

        let ip = forwarded
            .or_else(real_ip)
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        ClientIdentity(ip)
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(ClientIdentity::resolve(&parts.headers, peer))
    }
}

/// `local@domain` with no whitespace, exactly one `@`, and a dot in the domain
/// that has at least one character on each side.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .match_indices('.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

/// Accepts a JSON number or a numeric string as a row identifier.
pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Treats `null`, missing and whitespace-only strings alike.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / total` as a percentage with two decimals; zero when `total` is zero.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}
