//! SurrealDB implementation of [`PolicyRepository`].
//!
//! The policy is a singleton stored at `security_policy:current`.

use sclms_core::error::SclmsResult;
use sclms_core::models::policy::SecurityPolicy;
use sclms_core::repository::PolicyRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

const POLICY_KEY: &str = "current";

#[derive(Debug, SurrealValue)]
struct PolicyRow {
    minimum_length: u32,
    require_uppercase: bool,
    require_digit: bool,
    require_special_char: bool,
    password_expiry_days: u32,
    max_login_attempts: u32,
    lockout_duration_minutes: u32,
    session_timeout_minutes: u32,
    two_factor_globally_required: bool,
}

impl From<PolicyRow> for SecurityPolicy {
    fn from(row: PolicyRow) -> Self {
        Self {
            minimum_length: row.minimum_length,
            require_uppercase: row.require_uppercase,
            require_digit: row.require_digit,
            require_special_char: row.require_special_char,
            password_expiry_days: row.password_expiry_days,
            max_login_attempts: row.max_login_attempts,
            lockout_duration_minutes: row.lockout_duration_minutes,
            session_timeout_minutes: row.session_timeout_minutes,
            two_factor_globally_required: row.two_factor_globally_required,
        }
    }
}

/// SurrealDB implementation of the Policy repository.
#[derive(Clone)]
pub struct SurrealPolicyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPolicyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select(&self) -> Result<Option<SecurityPolicy>, DbError> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('security_policy', $key)")
            .bind(("key", POLICY_KEY.to_string()))
            .await?;

        let rows: Vec<PolicyRow> = result.take(0)?;
        Ok(rows.into_iter().next().map(SecurityPolicy::from))
    }

    /// Writes `policy` with the given statement verb (`CREATE` or `UPSERT`).
    async fn write(&self, verb: &str, policy: SecurityPolicy) -> Result<SecurityPolicy, DbError> {
        let query = format!(
            "{verb} type::record('security_policy', $key) SET \
             minimum_length = $minimum_length, \
             require_uppercase = $require_uppercase, \
             require_digit = $require_digit, \
             require_special_char = $require_special_char, \
             password_expiry_days = $password_expiry_days, \
             max_login_attempts = $max_login_attempts, \
             lockout_duration_minutes = $lockout_duration_minutes, \
             session_timeout_minutes = $session_timeout_minutes, \
             two_factor_globally_required = $two_factor_globally_required, \
             updated_at = time::now()"
        );

        let result = self
            .db
            .query(&query)
            .bind(("key", POLICY_KEY.to_string()))
            .bind(("minimum_length", policy.minimum_length))
            .bind(("require_uppercase", policy.require_uppercase))
            .bind(("require_digit", policy.require_digit))
            .bind(("require_special_char", policy.require_special_char))
            .bind(("password_expiry_days", policy.password_expiry_days))
            .bind(("max_login_attempts", policy.max_login_attempts))
            .bind(("lockout_duration_minutes", policy.lockout_duration_minutes))
            .bind(("session_timeout_minutes", policy.session_timeout_minutes))
            .bind((
                "two_factor_globally_required",
                policy.two_factor_globally_required,
            ))
            .await?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<PolicyRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(SecurityPolicy::from)
            .ok_or_else(|| DbError::NotFound {
                entity: "security_policy".into(),
                id: POLICY_KEY.into(),
            })
    }
}

impl<C: Connection> PolicyRepository for SurrealPolicyRepository<C> {
    async fn get_current(&self) -> SclmsResult<SecurityPolicy> {
        if let Some(policy) = self.select().await? {
            return Ok(policy);
        }

        match self.write("CREATE", SecurityPolicy::default()).await {
            Ok(policy) => {
                info!("Created default security policy");
                Ok(policy)
            }
            // Lost a creation race; the winner's row is what we want.
            Err(DbError::Query(_)) => self.select().await?.ok_or_else(|| {
                DbError::NotFound {
                    entity: "security_policy".into(),
                    id: POLICY_KEY.into(),
                }
                .into()
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, policy: SecurityPolicy) -> SclmsResult<SecurityPolicy> {
        Ok(self.write("UPSERT", policy).await?)
    }
}
