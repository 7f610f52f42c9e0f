//! Authentication error types.

use sclms_core::error::SclmsError;
use thiserror::Error;
use uuid::Uuid;

use crate::policy::PolicyViolation;
use crate::totp::TotpEnrollment;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email and wrong password are deliberately the same error.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account locked, try again in {retry_after_minutes} minutes")]
    AccountLocked { retry_after_minutes: i64 },

    #[error("account not approved yet")]
    AccountNotApproved,

    /// Password accepted but past its expiry; the caller must pick a new
    /// one before a token is issued.
    #[error("password has expired")]
    PasswordExpired { account_id: Uuid },

    #[error("password change required")]
    ForcedPasswordResetRequired { account_id: Uuid },

    /// Password accepted; a TOTP code must follow. `challenge` is the
    /// short-lived token that proves the password step passed and must be
    /// presented with the code. `enrollment` is set when policy demands a
    /// second factor the account has not set up yet.
    #[error("two-factor verification required")]
    TwoFactorRequired {
        account_id: Uuid,
        challenge: String,
        enrollment: Option<TotpEnrollment>,
    },

    /// The second-factor challenge is missing, expired, forged or was
    /// issued for another account.
    #[error("two-factor challenge is invalid or expired")]
    InvalidChallenge,

    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("two-factor authentication is not enabled")]
    TwoFactorNotEnrolled,

    #[error("two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("two-factor authentication is required by policy")]
    TwoFactorMandatory,

    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),

    #[error("invalid security policy: {0}")]
    InvalidPolicy(String),

    #[error("email is already registered")]
    EmailAlreadyRegistered,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("account not found")]
    AccountNotFound,

    /// Transient infrastructure failure; the only kind worth retrying.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::StoreUnavailable(_))
    }
}

const ACCOUNT_ENTITY: &str = "account";

/// Only a missing account is a caller-visible "not found". Any other
/// missing record (the policy singleton) means the store is broken.
impl From<SclmsError> for AuthError {
    fn from(err: SclmsError) -> Self {
        match err {
            SclmsError::NotFound { entity, .. } if entity == ACCOUNT_ENTITY => {
                AuthError::AccountNotFound
            }
            SclmsError::AlreadyExists { .. } => AuthError::EmailAlreadyRegistered,
            SclmsError::Validation { message } => AuthError::InvalidPolicy(message),
            other => AuthError::StoreUnavailable(other.to_string()),
        }
    }
}
