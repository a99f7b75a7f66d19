use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::SocketAddr;

use crate::domain::ClientMeta;

/// Client ip and user agent for a request. The ip is taken from the first
/// proxy header present: `CF-Connecting-IP`, `X-Forwarded-For`, `X-Real-IP`.
pub fn client_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientMeta {
    ClientMeta::new(client_ip(headers, peer), header_str(headers, USER_AGENT.as_str()))
}

/// Proxy-reported ip, else the address of the connected socket.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    extract_ip(headers).or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return Some(ip);
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    header_str(headers, "x-real-ip")
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
