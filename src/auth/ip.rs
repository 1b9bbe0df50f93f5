//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, extract::Request};

/// Key used when no client address is available (e.g. in-process tests).
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract the client IP address.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` entry wins (only
/// safe behind a reverse proxy that sets it). Otherwise the socket address
/// from `ConnectInfo` is used.
pub fn extract_client_ip(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
