use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;

use crate::security::jwt::AccessTokenClaims;

pub const ADMIN_ROLE: &str = "admin";

/// Runs after `auth_middleware`; rejects callers whose access token lacks the admin role.
pub async fn admin_only(req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(claims) = req.extensions().get::<AccessTokenClaims>() else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if !claims.has_role(ADMIN_ROLE) {
        warn!(user_id = %claims.sub, path = %req.uri().path(), "admin route denied");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}
