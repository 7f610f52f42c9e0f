//! Account domain model: the security-relevant projection of a user.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of roles an account can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Approver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Approver => "APPROVER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "APPROVER" => Ok(Role::Approver),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "PENDING",
            AccountStatus::Approved => "APPROVED",
            AccountStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AccountStatus::Pending),
            "APPROVED" => Ok(AccountStatus::Approved),
            "REJECTED" => Ok(AccountStatus::Rejected),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

/// Immutable snapshot of an account's lockout fields.
///
/// Transitions never mutate a snapshot in place: the lockout state
/// machine takes one and returns the next, which is then committed with
/// a compare-and-swap on [`Account::version`].
///
/// Invariant: `account_locked` implies `lockout_until.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityState {
    pub failed_login_count: u32,
    pub account_locked: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_failed_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Always stored lower-cased.
    pub email: String,
    pub name: String,
    pub organization: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub password_hash: String,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub force_password_reset: bool,
    pub security: SecurityState,
    pub two_factor_enabled: bool,
    /// Base32 TOTP secret, sealed with AES-256-GCM when a key is
    /// configured. Must be present whenever `two_factor_enabled` is set.
    pub two_factor_secret: Option<String>,
    /// Last TOTP time step accepted for this account (replay guard).
    pub last_totp_step: Option<u64>,
    /// Optimistic concurrency token, bumped on every save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub email: String,
    pub name: String,
    pub organization: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    /// Argon2id PHC string; raw passwords never reach the store.
    pub password_hash: String,
    pub force_password_reset: bool,
}

/// Account fields that are safe to hand back to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub organization: Option<String>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            status: account.status,
            organization: account.organization.clone(),
        }
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" Approver ".parse::<Role>().unwrap(), Role::Approver);
        assert!("ROLE_ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AccountStatus::Pending,
            AccountStatus::Approved,
            AccountStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<AccountStatus>().unwrap(), status);
        }
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
