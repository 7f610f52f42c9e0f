//! `/api/auth/*`: registration, login, logout, password change, profile.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sclms_auth::{AuthError, ChangePasswordInput, LoginInput, LoginOutput, RegisterInput};
use sclms_core::models::account::AccountSummary;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::gate::{AuthContext, Authenticated};
use crate::handlers::{Message, two_factor::TwoFactorSetup};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub organization: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: AccountSummary,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(body) = payload?;
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::BadRequest("Name and email are required".into()));
    }

    let user = state
        .auth
        .register(RegisterInput {
            name: body.name,
            email: body.email,
            password: body.password,
            organization: body.organization,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please wait for admin approval.",
            user,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: AccountSummary,
    pub message: &'static str,
}

impl From<LoginOutput> for TokenResponse {
    fn from(out: LoginOutput) -> Self {
        Self {
            token: out.access_token,
            token_type: out.token_type,
            expires_in: out.expires_in,
            user: out.account,
            message: "Login successful",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStepResponse {
    #[serde(rename = "requires2FA", skip_serializing_if = "Option::is_none")]
    pub requires_2fa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_password_change: Option<bool>,
    pub user_id: Uuid,
    pub message: &'static str,
    /// Must accompany the code sent to `/api/2fa/verify`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<TwoFactorSetup>,
}

impl PendingStepResponse {
    fn password_change(user_id: Uuid, message: &'static str) -> Self {
        Self {
            requires_2fa: None,
            requires_password_change: Some(true),
            user_id,
            message,
            challenge: None,
            setup: None,
        }
    }
}

/// Turn the "not finished yet" outcomes into 200 responses that tell
/// the client what to do next. Everything else stays an error.
pub(crate) fn login_result(result: Result<LoginOutput, AuthError>) -> Result<Response, ApiError> {
    match result {
        Ok(out) => Ok(Json(TokenResponse::from(out)).into_response()),
        Err(AuthError::TwoFactorRequired {
            account_id,
            challenge,
            enrollment,
        }) => {
            let message = if enrollment.is_some() {
                "2FA setup required. Scan the QR code and enter the code from your authenticator app."
            } else {
                "2FA verification required"
            };
            Ok(Json(PendingStepResponse {
                requires_2fa: Some(true),
                requires_password_change: None,
                user_id: account_id,
                message,
                challenge: Some(challenge),
                setup: enrollment.map(TwoFactorSetup::from),
            })
            .into_response())
        }
        Err(AuthError::ForcedPasswordResetRequired { account_id }) => {
            Ok(Json(PendingStepResponse::password_change(
                account_id,
                "Password change required. Please change your password.",
            ))
            .into_response())
        }
        Err(AuthError::PasswordExpired { account_id }) => {
            Ok(Json(PendingStepResponse::password_change(
                account_id,
                "Password has expired. Please change your password.",
            ))
            .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let result = state
        .auth
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await;
    login_result(result)
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(context: AuthContext) -> Json<Message> {
    if let AuthContext::Authenticated(principal) = context {
        info!(account_id = %principal.account.id, "Logout");
    }
    Json(Message::new("Logged out successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Only consulted when the caller is not authenticated, e.g. right
    /// after a login that demanded a password change.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    context: AuthContext,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(body) = payload?;
    let account_id = match (&context, body.user_id) {
        (AuthContext::Authenticated(principal), _) => principal.account.id,
        (AuthContext::Unavailable, _) => {
            return Err(AuthError::StoreUnavailable("token could not be verified".into()).into());
        }
        (_, Some(id)) => id,
        (_, None) => return Err(ApiError::Unauthorized),
    };

    state
        .auth
        .change_password(ChangePasswordInput {
            account_id,
            current_password: body.current_password,
            new_password: body.new_password,
        })
        .await?;

    Ok(Json(Message::new("Password changed successfully")))
}

pub async fn profile(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<AccountSummary>, ApiError> {
    Ok(Json(state.auth.profile(principal.account.id).await?))
}
