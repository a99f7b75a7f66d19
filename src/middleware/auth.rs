use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::domain::AuthError;
use crate::security::jwt::AccessTokenClaims;
use crate::state::AppState;

/// Verifies the bearer access token and exposes its claims as a request extension.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_from_header(req.headers())
        .ok_or_else(|| AuthError::InvalidToken("missing bearer token".into()))?;
    let claims: AccessTokenClaims = state.jwt.verify(&token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
