use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::domain::AuthError;
use crate::middleware::{auth::auth_middleware, rate_limit::rate_limit};
use crate::security::client::client_meta;
use crate::security::jwt::AccessTokenClaims;
use crate::service::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
use crate::state::AppState;

pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let authenticated = Router::new()
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/me", get(me))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .merge(authenticated)
        .layer(from_fn_with_state(state.clone(), rate_limit))
}

#[derive(Serialize)]
pub(crate) struct RevokedCount {
    pub revoked: u64,
}

async fn login(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let client = client_meta(&headers, peer.map(|ConnectInfo(addr)| addr));
    Ok(Json(state.login.execute(payload, &client).await?))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let client = client_meta(&headers, peer.map(|ConnectInfo(addr)| addr));
    Ok(Json(state.refresh.execute(payload, &client).await?))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    state.rotation.end_session(payload.refresh_token.trim()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout_all(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<RevokedCount>, AuthError> {
    let revoked = state.rotation.revoke_user(&claims.sub).await?;
    Ok(Json(RevokedCount { revoked }))
}

async fn me(Extension(claims): Extension<AccessTokenClaims>) -> Json<AccessTokenClaims> {
    Json(claims)
}
