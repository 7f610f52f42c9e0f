//! Organization-wide security policy.

use serde::{Deserialize, Serialize};

/// Singleton policy record read by the password policy engine and the
/// lockout state machine. Created with defaults on first read, changed
/// only by administrative update, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub minimum_length: u32,
    pub require_uppercase: bool,
    pub require_digit: bool,
    pub require_special_char: bool,
    pub password_expiry_days: u32,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: u32,
    pub session_timeout_minutes: u32,
    pub two_factor_globally_required: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            minimum_length: 8,
            require_uppercase: true,
            require_digit: true,
            require_special_char: false,
            password_expiry_days: 90,
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
            session_timeout_minutes: 30,
            two_factor_globally_required: false,
        }
    }
}
