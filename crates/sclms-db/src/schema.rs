//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! upper-case strings guarded by ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "account_security",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Accounts: identity, credential, lockout and second-factor state
-- =======================================================================
DEFINE TABLE account SCHEMAFULL;
DEFINE FIELD account_id ON TABLE account TYPE string;
DEFINE FIELD email ON TABLE account TYPE string;
DEFINE FIELD name ON TABLE account TYPE string;
DEFINE FIELD organization ON TABLE account TYPE option<string>;
DEFINE FIELD role ON TABLE account TYPE string \
    ASSERT $value IN ['USER', 'APPROVER', 'ADMIN'];
DEFINE FIELD status ON TABLE account TYPE string \
    ASSERT $value IN ['PENDING', 'APPROVED', 'REJECTED'];
DEFINE FIELD password_hash ON TABLE account TYPE string;
DEFINE FIELD password_changed_at ON TABLE account TYPE option<datetime>;
DEFINE FIELD force_password_reset ON TABLE account TYPE bool DEFAULT false;
DEFINE FIELD failed_login_count ON TABLE account TYPE int DEFAULT 0;
DEFINE FIELD account_locked ON TABLE account TYPE bool DEFAULT false;
DEFINE FIELD lockout_until ON TABLE account TYPE option<datetime>;
DEFINE FIELD last_failed_login_at ON TABLE account TYPE option<datetime>;
DEFINE FIELD two_factor_enabled ON TABLE account TYPE bool DEFAULT false;
DEFINE FIELD two_factor_secret ON TABLE account TYPE option<string>;
DEFINE FIELD last_totp_step ON TABLE account TYPE option<int>;
DEFINE FIELD version ON TABLE account TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_email ON TABLE account COLUMNS email UNIQUE;

-- =======================================================================
-- Security policy (singleton record security_policy:current)
-- =======================================================================
DEFINE TABLE security_policy SCHEMAFULL;
DEFINE FIELD minimum_length ON TABLE security_policy TYPE int \
    ASSERT $value >= 1;
DEFINE FIELD require_uppercase ON TABLE security_policy TYPE bool;
DEFINE FIELD require_digit ON TABLE security_policy TYPE bool;
DEFINE FIELD require_special_char ON TABLE security_policy TYPE bool;
DEFINE FIELD password_expiry_days ON TABLE security_policy TYPE int;
DEFINE FIELD max_login_attempts ON TABLE security_policy TYPE int \
    ASSERT $value >= 1;
DEFINE FIELD lockout_duration_minutes ON TABLE security_policy TYPE int;
DEFINE FIELD session_timeout_minutes ON TABLE security_policy TYPE int;
DEFINE FIELD two_factor_globally_required ON TABLE security_policy \
    TYPE bool;
DEFINE FIELD updated_at ON TABLE security_policy TYPE datetime \
    DEFAULT time::now();
";

async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let records: Vec<MigrationRecord> = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?
        .take(0)?;
    Ok(records.first().map_or(0, |m| m.version))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    let failed = |stage: &str, e: surrealdb::Error| {
        DbError::Migration(format!(
            "v{} ({}) {stage}: {e}",
            migration.version, migration.name
        ))
    };

    db.query(migration.sql)
        .await?
        .check()
        .map_err(|e| failed("failed", e))?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name.to_string()))
        .await?
        .check()
        .map_err(|e| failed("could not be recorded", e))?;
    Ok(())
}

/// Bring the schema up to date.
///
/// Safe to call on every start-up: only migrations newer than the
/// highest recorded version run, in ascending order.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("tracking table: {e}")))?;

    let current = current_version(db).await?;
    let mut pending = MIGRATIONS.iter().filter(|m| m.version > current).peekable();
    if pending.peek().is_none() {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        apply(db, migration).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn schema_defines_unique_email_index() {
        assert!(SCHEMA_V1.contains("idx_account_email ON TABLE account COLUMNS email UNIQUE"));
    }
}
