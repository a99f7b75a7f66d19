use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::RevokedCount;
use crate::domain::{AuthError, RefreshTokenRecord, RevocationReason};
use crate::middleware::{admin::admin_only, auth::auth_middleware};
use crate::state::AppState;

pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/tokens/:jti/revoke", post(revoke_token))
        .route("/admin/families/:family_id/revoke", post(revoke_family))
        .route("/admin/families/:family_id/tokens", get(family_tokens))
        .route_layer(from_fn(admin_only))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

#[derive(Deserialize)]
struct RevokePayload {
    reason: Option<RevocationReason>,
}

impl RevokePayload {
    /// A request without a JSON body revokes as `manual`; a malformed one is rejected.
    fn reason(payload: Result<Json<RevokePayload>, JsonRejection>) -> Result<RevocationReason, AuthError> {
        match payload {
            Ok(Json(p)) => Ok(p.reason.unwrap_or(RevocationReason::Manual)),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(RevocationReason::Manual),
            Err(rejection) => Err(AuthError::BadRequest(rejection.body_text())),
        }
    }
}

async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Path(jti): Path<String>,
    payload: Result<Json<RevokePayload>, JsonRejection>,
) -> Result<StatusCode, AuthError> {
    let reason = RevokePayload::reason(payload)?;
    state.rotation.revoke(&jti, reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_family(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<String>,
    payload: Result<Json<RevokePayload>, JsonRejection>,
) -> Result<Json<RevokedCount>, AuthError> {
    let reason = RevokePayload::reason(payload)?;
    let revoked = state.rotation.revoke_family(&family_id, reason).await?;
    Ok(Json(RevokedCount { revoked }))
}

async fn family_tokens(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<String>,
) -> Result<Json<Vec<RefreshTokenRecord>>, AuthError> {
    Ok(Json(state.rotation.family_records(&family_id).await?))
}
