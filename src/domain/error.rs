use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every failure the session protocol can surface. Each path maps to exactly
/// one variant and is propagated unchanged to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("refresh token expired")]
    TokenExpired,

    #[error("refresh token not found")]
    TokenNotFound,

    #[error("refresh token revoked")]
    TokenRevoked,

    /// The family has already been revoked when this is returned.
    #[error("refresh token reuse detected in family {family_id}")]
    TokenReuseDetected { family_id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("provider rejected the access token")]
    ProviderRejected,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidToken(_)
            | AuthError::TokenExpired
            | AuthError::TokenNotFound
            | AuthError::TokenRevoked
            | AuthError::TokenReuseDetected { .. }
            | AuthError::ProviderRejected => StatusCode::UNAUTHORIZED,
            AuthError::UnsupportedProvider(_) | AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            AuthError::Conflict(_) | AuthError::Storage(_) | AuthError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenNotFound => "TOKEN_NOT_FOUND",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::TokenReuseDetected { .. } => "TOKEN_REUSE_DETECTED",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::Signing(_) => "SIGNING_ERROR",
            AuthError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            AuthError::ProviderRejected => "PROVIDER_REJECTED",
            AuthError::Provider(_) => "PROVIDER_ERROR",
            AuthError::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AuthError::Conflict(db_err.message().to_string());
            }
        }
        AuthError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Provider(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: bool,
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AuthError::Conflict(_) | AuthError::Storage(_) | AuthError::Signing(_) => {
                tracing::error!(error = %self, "request failed");
                "internal error".to_string()
            }
            _ => self.to_string(),
        };
        let body = ErrorBody {
            error: true,
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
