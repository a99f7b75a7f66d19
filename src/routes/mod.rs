use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod admin;
mod auth;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::router(&state))
        .merge(admin::router(&state))
        .route("/health", get(|| async { "OK" }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
