//! Integration tests for the Policy repository and schema migrations.

use sclms_core::models::policy::SecurityPolicy;
use sclms_core::repository::PolicyRepository;
use sclms_db::repository::SurrealPolicyRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    sclms_db::run_migrations(&db).await.unwrap();
    db
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = setup().await;
    sclms_db::run_migrations(&db).await.unwrap();
}

#[tokio::test]
async fn first_read_creates_default_policy() {
    let repo = SurrealPolicyRepository::new(setup().await);

    let policy = repo.get_current().await.unwrap();
    assert_eq!(policy, SecurityPolicy::default());

    // Second read returns the stored row rather than creating another.
    let again = repo.get_current().await.unwrap();
    assert_eq!(again, policy);
}

#[tokio::test]
async fn update_replaces_current_policy() {
    let repo = SurrealPolicyRepository::new(setup().await);
    repo.get_current().await.unwrap();

    let updated = SecurityPolicy {
        minimum_length: 12,
        require_special_char: true,
        max_login_attempts: 3,
        two_factor_globally_required: true,
        ..SecurityPolicy::default()
    };
    let stored = repo.update(updated.clone()).await.unwrap();
    assert_eq!(stored, updated);
    assert_eq!(repo.get_current().await.unwrap(), updated);
}

#[tokio::test]
async fn update_before_first_read_creates_row() {
    let repo = SurrealPolicyRepository::new(setup().await);

    let policy = SecurityPolicy {
        lockout_duration_minutes: 60,
        ..SecurityPolicy::default()
    };
    repo.update(policy.clone()).await.unwrap();
    assert_eq!(repo.get_current().await.unwrap(), policy);
}
