//! `/api/2fa/*`: enrollment, confirmation, removal and the second login step.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use sclms_auth::{AuthError, TotpEnrollment};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::gate::Authenticated;
use crate::handlers::Message;
use crate::handlers::auth::login_result;
use crate::state::AppState;

/// Authenticator-app codes, sent either as a string or as a JSON number.
/// A number loses its leading zeros, so it is padded back to six digits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TotpCode {
    Text(String),
    Number(u32),
}

impl TotpCode {
    pub fn as_digits(&self) -> String {
        match self {
            TotpCode::Text(code) => code.trim().to_string(),
            TotpCode::Number(n) => format!("{n:06}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetup {
    pub secret: String,
    pub qr_url: String,
}

impl From<TotpEnrollment> for TwoFactorSetup {
    fn from(enrollment: TotpEnrollment) -> Self {
        Self {
            secret: enrollment.secret,
            qr_url: enrollment.provisioning_uri,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    #[serde(flatten)]
    pub setup: TwoFactorSetup,
    pub message: &'static str,
}

pub async fn setup(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<SetupResponse>, ApiError> {
    let enrollment = state.auth.enroll_two_factor(principal.account.id).await?;
    Ok(Json(SetupResponse {
        setup: enrollment.into(),
        message: "Scan the QR code with your authenticator app, then confirm with a code",
    }))
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: TotpCode,
}

pub async fn enable(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(body) = payload?;
    state
        .auth
        .confirm_two_factor(principal.account.id, &body.code.as_digits())
        .await?;
    Ok(Json(Message::new("2FA enabled successfully")))
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub password: String,
    pub code: TotpCode,
}

pub async fn disable(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<DisableRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(body) = payload?;
    state
        .auth
        .disable_two_factor(principal.account.id, &body.password, &body.code.as_digits())
        .await?;
    Ok(Json(Message::new("2FA disabled successfully")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub user_id: Uuid,
    /// Returned by the login that asked for the code.
    #[serde(default)]
    pub challenge: Option<String>,
    pub code: TotpCode,
}

/// Second login step: exchanges the login challenge plus a valid code
/// for a token.
pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let Some(challenge) = body.challenge else {
        return Err(AuthError::InvalidChallenge.into());
    };
    let result = state
        .auth
        .verify_two_factor(body.user_id, &challenge, &body.code.as_digits())
        .await;
    login_result(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(value: serde_json::Value) -> String {
        serde_json::from_value::<TotpCode>(value).unwrap().as_digits()
    }

    #[test]
    fn numeric_codes_keep_leading_zeros() {
        assert_eq!(code(json!(42)), "000042");
        assert_eq!(code(json!(123456)), "123456");
    }

    #[test]
    fn string_codes_are_trimmed() {
        assert_eq!(code(json!(" 012345 ")), "012345");
    }

    #[test]
    fn setup_serializes_qr_url_in_camel_case() {
        let body = SetupResponse {
            setup: TwoFactorSetup {
                secret: "ABC".into(),
                qr_url: "otpauth://totp/x".into(),
            },
            message: "m",
        };
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["qrUrl"], "otpauth://totp/x");
        assert_eq!(value["secret"], "ABC");
    }
}
