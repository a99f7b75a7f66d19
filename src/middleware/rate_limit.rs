use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::security::client::client_ip;
use crate::state::AppState;

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer).unwrap_or_else(|| "unknown".into());
    let key = format!("{}:{}", ip, req.uri().path());

    if !state.rate_limiter.check(&key) {
        warn!(%ip, path = %req.uri().path(), "rate limit exceeded");
        return Err((StatusCode::TOO_MANY_REQUESTS, "rate_limited"));
    }
    Ok(next.run(req).await)
}
