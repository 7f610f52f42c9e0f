//! HTTP error envelope.
//!
//! Every failure leaves the server as `{"error": "<message>"}`. Messages
//! are written for end users; internal detail goes to the log only.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sclms_auth::AuthError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Protected route reached without a valid bearer token.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn locked_message(retry_after_minutes: i64) -> String {
    if retry_after_minutes > 0 {
        format!("Account locked. Try again in {retry_after_minutes} minutes.")
    } else {
        "Account locked. Please contact an administrator.".to_string()
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".into()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Auth(err) => auth_status(err),
        }
    }
}

fn auth_status(err: &AuthError) -> (StatusCode, String) {
    use AuthError::*;

    let unauthorized = StatusCode::UNAUTHORIZED;
    let bad_request = StatusCode::BAD_REQUEST;
    match err {
        InvalidCredentials => (unauthorized, "Invalid email or password".into()),
        AccountLocked {
            retry_after_minutes,
        } => (unauthorized, locked_message(*retry_after_minutes)),
        AccountNotApproved => (
            unauthorized,
            "Account not approved yet. Please wait for admin approval.".into(),
        ),
        PasswordExpired { .. } => (
            unauthorized,
            "Password has expired. Please change your password.".into(),
        ),
        ForcedPasswordResetRequired { .. } => (
            unauthorized,
            "Password change required. Please change your password.".into(),
        ),
        TwoFactorRequired { .. } => (unauthorized, "2FA verification required".into()),
        InvalidChallenge => (
            unauthorized,
            "2FA session expired or invalid. Please log in again.".into(),
        ),
        InvalidTwoFactorCode => (bad_request, "Invalid 2FA code".into()),
        TwoFactorNotEnrolled => (bad_request, "2FA not enabled".into()),
        TwoFactorAlreadyEnabled => (bad_request, "2FA already enabled".into()),
        TwoFactorMandatory => (
            bad_request,
            "2FA is required by the security policy and cannot be disabled".into(),
        ),
        PolicyViolation(violation) => (bad_request, violation.to_string()),
        InvalidPolicy(msg) => (bad_request, format!("Invalid security policy: {msg}")),
        EmailAlreadyRegistered => (StatusCode::CONFLICT, "Email already registered".into()),
        TokenExpired | TokenInvalid(_) => (unauthorized, "Unauthorized".into()),
        AccountNotFound => (StatusCode::NOT_FOUND, "User not found".into()),
        StoreUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable. Please try again.".into(),
        ),
        Crypto(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".into(),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else if let ApiError::BadRequest(detail) = &self {
            warn!(%detail, "Malformed request");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
