use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

use parley_types::api::ErrorReply;

/// Failures of a chat operation.
///
/// `Unauthorized` and `Internal` fail the call outright; every other variant
/// is an expected business outcome that the caller gets back as
/// `{ "ok": false, "error": CODE }`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing, unknown or expired session token")]
    Unauthorized,

    #[error("email already registered")]
    EmailInUse,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not an active member of this conversation")]
    NotAMember,

    #[error("unknown user {0}")]
    UnknownUser(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::EmailInUse => "EMAIL_IN_USE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotAMember => "NOT_A_MEMBER",
            Self::UnknownUser(_) => "UNKNOWN_USER",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }
        (self.status(), Json(ErrorReply::new(self.code()))).into_response()
    }
}
