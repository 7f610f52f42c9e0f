//! Integration tests for the Account repository using in-memory SurrealDB.

use chrono::{Duration, Utc};
use sclms_core::error::SclmsError;
use sclms_core::models::account::{AccountStatus, CreateAccount, Role};
use sclms_core::repository::AccountRepository;
use sclms_db::repository::SurrealAccountRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> SurrealAccountRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    sclms_db::run_migrations(&db).await.unwrap();
    SurrealAccountRepository::new(db)
}

fn alice() -> CreateAccount {
    CreateAccount {
        email: "Alice@Example.com".into(),
        name: "Alice".into(),
        organization: Some("Acme".into()),
        role: Role::Approver,
        status: AccountStatus::Approved,
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        force_password_reset: false,
    }
}

#[tokio::test]
async fn create_and_fetch_account() {
    let repo = setup().await;

    let created = repo.create(alice()).await.unwrap();
    assert_eq!(created.email, "alice@example.com");
    assert_eq!(created.role, Role::Approver);
    assert_eq!(created.status, AccountStatus::Approved);
    assert_eq!(created.version, 0);
    assert_eq!(created.security.failed_login_count, 0);
    assert!(!created.security.account_locked);
    let changed_at = created.password_changed_at.unwrap();
    assert!(Utc::now() - changed_at < Duration::minutes(1));
    assert!(created.two_factor_secret.is_none());

    let by_id = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(by_id.email, created.email);

    let by_email = repo.get_by_email("ALICE@example.COM").await.unwrap();
    assert_eq!(by_email.id, created.id);
}

#[tokio::test]
async fn exists_by_email_is_case_insensitive() {
    let repo = setup().await;
    assert!(!repo.exists_by_email("alice@example.com").await.unwrap());

    repo.create(alice()).await.unwrap();
    assert!(repo.exists_by_email("alice@EXAMPLE.com").await.unwrap());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let repo = setup().await;
    repo.create(alice()).await.unwrap();

    let err = repo.create(alice()).await.unwrap_err();
    assert!(
        matches!(err, SclmsError::AlreadyExists { .. }),
        "expected AlreadyExists, got {err:?}"
    );
}

#[tokio::test]
async fn missing_account_is_not_found() {
    let repo = setup().await;

    let err = repo.get_by_email("nobody@example.com").await.unwrap_err();
    assert!(matches!(err, SclmsError::NotFound { .. }));

    let err = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SclmsError::NotFound { .. }));
}

#[tokio::test]
async fn save_persists_security_fields_and_bumps_version() {
    let repo = setup().await;
    let mut account = repo.create(alice()).await.unwrap();

    let now = chrono::Utc::now();
    account.security.failed_login_count = 5;
    account.security.account_locked = true;
    account.security.lockout_until = Some(now + chrono::Duration::minutes(15));
    account.security.last_failed_login_at = Some(now);
    account.two_factor_secret = Some("JBSWY3DPEHPK3PXP".into());
    account.last_totp_step = Some(42);

    let saved = repo.save(account).await.unwrap();
    assert_eq!(saved.version, 1);
    assert_eq!(saved.security.failed_login_count, 5);
    assert!(saved.security.account_locked);
    assert!(saved.security.lockout_until.is_some());
    assert_eq!(saved.two_factor_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    assert_eq!(saved.last_totp_step, Some(42));

    let reloaded = repo.get_by_id(saved.id).await.unwrap();
    assert_eq!(reloaded.version, 1);
    assert_eq!(reloaded.security.failed_login_count, 5);
}

#[tokio::test]
async fn stale_snapshot_is_rejected_without_writing() {
    let repo = setup().await;
    let original = repo.create(alice()).await.unwrap();

    let mut first = original.clone();
    first.security.failed_login_count = 1;
    repo.save(first).await.unwrap();

    // Second writer still holds version 0.
    let mut stale = original;
    stale.security.failed_login_count = 1;
    let err = repo.save(stale).await.unwrap_err();
    assert!(
        matches!(err, SclmsError::Conflict { .. }),
        "expected Conflict, got {err:?}"
    );

    let current = repo.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.security.failed_login_count, 1);
}

#[tokio::test]
async fn save_of_deleted_account_is_not_found() {
    let repo = setup().await;
    let mut ghost = repo.create(alice()).await.unwrap();
    ghost.id = uuid::Uuid::new_v4();

    let err = repo.save(ghost).await.unwrap_err();
    assert!(matches!(err, SclmsError::NotFound { .. }));
}
