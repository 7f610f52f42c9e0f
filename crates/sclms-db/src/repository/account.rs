//! SurrealDB implementation of [`AccountRepository`].
//!
//! Every write goes through `save`, which only succeeds when the stored
//! `version` matches the snapshot being written. The check and the write
//! happen in one `UPDATE ... WHERE version = $version` statement, so two
//! concurrent lockout transitions on the same account cannot both land.

use chrono::{DateTime, Utc};
use sclms_core::error::{SclmsError, SclmsResult};
use sclms_core::models::account::{
    Account, AccountStatus, CreateAccount, Role, SecurityState, normalize_email,
};
use sclms_core::repository::AccountRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AccountRow {
    account_id: String,
    email: String,
    name: String,
    organization: Option<String>,
    role: String,
    status: String,
    password_hash: String,
    password_changed_at: Option<DateTime<Utc>>,
    force_password_reset: bool,
    failed_login_count: u32,
    account_locked: bool,
    lockout_until: Option<DateTime<Utc>>,
    last_failed_login_at: Option<DateTime<Utc>>,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    last_totp_step: Option<u64>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct ExistsRow {
    total: u64,
}

impl AccountRow {
    fn try_into_account(self) -> Result<Account, DbError> {
        let id = Uuid::parse_str(&self.account_id)
            .map_err(|e| DbError::Corrupt(format!("invalid account UUID: {e}")))?;
        let role: Role = self.role.parse().map_err(DbError::Corrupt)?;
        let status: AccountStatus = self.status.parse().map_err(DbError::Corrupt)?;

        Ok(Account {
            id,
            email: self.email,
            name: self.name,
            organization: self.organization,
            role,
            status,
            password_hash: self.password_hash,
            password_changed_at: self.password_changed_at,
            force_password_reset: self.force_password_reset,
            security: SecurityState {
                failed_login_count: self.failed_login_count,
                account_locked: self.account_locked,
                lockout_until: self.lockout_until,
                last_failed_login_at: self.last_failed_login_at,
            },
            two_factor_enabled: self.two_factor_enabled,
            two_factor_secret: self.two_factor_secret,
            last_totp_step: self.last_totp_step,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn first_account(rows: Vec<AccountRow>, id: String) -> Result<Account, DbError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id,
        })?
        .try_into_account()
}

/// Concurrent transactions touching the same record abort with a
/// retryable commit conflict; report those like a stale version.
fn write_error(message: String, id: &str) -> DbError {
    if message.to_ascii_lowercase().contains("conflict") {
        DbError::Conflict {
            entity: "account".into(),
            id: id.to_string(),
        }
    } else {
        DbError::Query(message)
    }
}

/// SurrealDB implementation of the Account repository.
#[derive(Clone)]
pub struct SurrealAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccountRepository for SurrealAccountRepository<C> {
    async fn create(&self, input: CreateAccount) -> SclmsResult<Account> {
        let id_str = Uuid::new_v4().to_string();
        let email = normalize_email(&input.email);

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 account_id = $id, \
                 email = $email, name = $name, \
                 organization = $organization, \
                 role = $role, status = $status, \
                 password_hash = $password_hash, \
                 password_changed_at = time::now(), \
                 force_password_reset = $force_password_reset, \
                 failed_login_count = 0, \
                 account_locked = false, \
                 lockout_until = NONE, \
                 last_failed_login_at = NONE, \
                 two_factor_enabled = false, \
                 two_factor_secret = NONE, \
                 last_totp_step = NONE, \
                 version = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", email))
            .bind(("name", input.name))
            .bind(("organization", input.organization))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .bind(("password_hash", input.password_hash))
            .bind(("force_password_reset", input.force_password_reset))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            let message = e.to_string();
            if message.contains("idx_account_email") {
                SclmsError::AlreadyExists {
                    entity: "account".into(),
                }
            } else {
                DbError::Query(message).into()
            }
        })?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_account(rows, id_str)?)
    }

    async fn get_by_id(&self, id: Uuid) -> SclmsResult<Account> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('account', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_account(rows, id_str)?)
    }

    async fn get_by_email(&self, email: &str) -> SclmsResult<Account> {
        let email = normalize_email(email);

        let mut result = self
            .db
            .query("SELECT * FROM account WHERE email = $email")
            .bind(("email", email.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        Ok(first_account(rows, format!("email={email}"))?)
    }

    async fn exists_by_email(&self, email: &str) -> SclmsResult<bool> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM account WHERE email = $email GROUP ALL")
            .bind(("email", normalize_email(email)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ExistsRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|r| r.total > 0))
    }

    async fn save(&self, account: Account) -> SclmsResult<Account> {
        let id_str = account.id.to_string();
        let expected = account.version;

        let result = self
            .db
            .query(
                "UPDATE type::record('account', $id) SET \
                 email = $email, name = $name, \
                 organization = $organization, \
                 role = $role, status = $status, \
                 password_hash = $password_hash, \
                 password_changed_at = $password_changed_at, \
                 force_password_reset = $force_password_reset, \
                 failed_login_count = $failed_login_count, \
                 account_locked = $account_locked, \
                 lockout_until = $lockout_until, \
                 last_failed_login_at = $last_failed_login_at, \
                 two_factor_enabled = $two_factor_enabled, \
                 two_factor_secret = $two_factor_secret, \
                 last_totp_step = $last_totp_step, \
                 version = $next_version, \
                 updated_at = time::now() \
                 WHERE version = $version",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", normalize_email(&account.email)))
            .bind(("name", account.name))
            .bind(("organization", account.organization))
            .bind(("role", account.role.as_str().to_string()))
            .bind(("status", account.status.as_str().to_string()))
            .bind(("password_hash", account.password_hash))
            .bind(("password_changed_at", account.password_changed_at))
            .bind(("force_password_reset", account.force_password_reset))
            .bind(("failed_login_count", account.security.failed_login_count))
            .bind(("account_locked", account.security.account_locked))
            .bind(("lockout_until", account.security.lockout_until))
            .bind(("last_failed_login_at", account.security.last_failed_login_at))
            .bind(("two_factor_enabled", account.two_factor_enabled))
            .bind(("two_factor_secret", account.two_factor_secret))
            .bind(("last_totp_step", account.last_totp_step))
            .bind(("next_version", expected + 1))
            .bind(("version", expected))
            .await
            .map_err(|e| write_error(e.to_string(), &id_str))?;

        let mut result = result
            .check()
            .map_err(|e| write_error(e.to_string(), &id_str))?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(row.try_into_account()?);
        }

        // Nothing matched: either the record is gone or someone else won.
        self.get_by_id(account.id).await?;
        debug!(account_id = %id_str, version = expected, "Stale account snapshot rejected");
        Err(DbError::Conflict {
            entity: "account".into(),
            id: id_str,
        }
        .into())
    }
}
