//! Behaviour of the authentication service when the account store stalls
//! or never lets a compare-and-swap through.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use sclms_auth::config::AuthConfig;
use sclms_auth::error::AuthError;
use sclms_auth::service::{AuthService, LoginInput};
use sclms_core::error::{SclmsError, SclmsResult};
use sclms_core::models::account::{Account, AccountStatus, CreateAccount, Role, SecurityState};
use sclms_core::repository::AccountRepository;
use sclms_db::repository::{SurrealAccountRepository, SurrealPolicyRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

const PASSWORD: &str = "Correct1horse";
const STORE_TIMEOUT: Duration = Duration::from_millis(50);
const RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// Every save hangs well past the store timeout.
    StalledSave,
    /// Every read hangs well past the store timeout.
    StalledRead,
    /// Every save reports that the snapshot is stale.
    Conflict,
}

/// Account store that delegates to SurrealDB but injects one fault.
#[derive(Clone)]
struct FaultyAccounts {
    inner: SurrealAccountRepository<Db>,
    fault: Fault,
    saves: Arc<AtomicU32>,
}

impl FaultyAccounts {
    async fn stall() {
        tokio::time::sleep(STORE_TIMEOUT * 20).await;
    }
}

impl AccountRepository for FaultyAccounts {
    async fn create(&self, input: CreateAccount) -> SclmsResult<Account> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> SclmsResult<Account> {
        if self.fault == Fault::StalledRead {
            Self::stall().await;
        }
        self.inner.get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> SclmsResult<Account> {
        if self.fault == Fault::StalledRead {
            Self::stall().await;
        }
        self.inner.get_by_email(email).await
    }

    async fn exists_by_email(&self, email: &str) -> SclmsResult<bool> {
        self.inner.exists_by_email(email).await
    }

    async fn save(&self, account: Account) -> SclmsResult<Account> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::StalledSave => {
                Self::stall().await;
                self.inner.save(account).await
            }
            Fault::Conflict => Err(SclmsError::Conflict {
                entity: "account".into(),
                id: account.id.to_string(),
            }),
            Fault::StalledRead => self.inner.save(account).await,
        }
    }
}

struct Harness {
    service: AuthService<FaultyAccounts, SurrealPolicyRepository<Db>>,
    store: SurrealAccountRepository<Db>,
    saves: Arc<AtomicU32>,
}

async fn setup(fault: Fault) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    sclms_db::run_migrations(&db).await.unwrap();

    let store = SurrealAccountRepository::new(db.clone());
    let saves = Arc::new(AtomicU32::new(0));
    let accounts = FaultyAccounts {
        inner: store.clone(),
        fault,
        saves: saves.clone(),
    };
    let config = AuthConfig {
        store_timeout: STORE_TIMEOUT,
        max_update_retries: RETRIES,
        ..AuthConfig::default()
    };
    Harness {
        service: AuthService::new(accounts, SurrealPolicyRepository::new(db), config),
        store,
        saves,
    }
}

impl Harness {
    async fn account(&self, security: SecurityState) -> Account {
        let created = self
            .store
            .create(CreateAccount {
                email: "alice@example.com".into(),
                name: "Alice".into(),
                organization: None,
                role: Role::User,
                status: AccountStatus::Approved,
                password_hash: sclms_auth::password::hash_password(PASSWORD, None).unwrap(),
                force_password_reset: false,
            })
            .await
            .unwrap();
        let mut seeded = created;
        seeded.security = security;
        self.store.save(seeded).await.unwrap()
    }

    async fn wrong_password(&self) -> AuthError {
        self.service
            .login(LoginInput {
                email: "alice@example.com".into(),
                password: "Wrong1password".into(),
            })
            .await
            .unwrap_err()
    }

    async fn stored_security(&self, id: Uuid) -> SecurityState {
        self.store.get_by_id(id).await.unwrap().security
    }
}

fn two_failures() -> SecurityState {
    SecurityState {
        failed_login_count: 2,
        account_locked: false,
        lockout_until: None,
        last_failed_login_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn stalled_save_times_out_without_recording_the_failure() {
    let h = setup(Fault::StalledSave).await;
    let account = h.account(two_failures()).await;

    let err = h.wrong_password().await;
    assert!(matches!(err, AuthError::StoreUnavailable(_)), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(h.saves.load(Ordering::SeqCst), 1);
    assert_eq!(h.stored_security(account.id).await, account.security);
}

#[tokio::test]
async fn stalled_lookup_times_out() {
    let h = setup(Fault::StalledRead).await;
    let account = h.account(SecurityState::default()).await;

    let err = h
        .service
        .login(LoginInput {
            email: "alice@example.com".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StoreUnavailable(_)), "{err:?}");
    assert_eq!(h.saves.load(Ordering::SeqCst), 0);
    assert_eq!(h.stored_security(account.id).await, account.security);
}

#[tokio::test]
async fn endless_conflicts_give_up_after_the_retry_budget() {
    let h = setup(Fault::Conflict).await;
    let account = h.account(two_failures()).await;

    let err = h.wrong_password().await;
    assert!(matches!(err, AuthError::StoreUnavailable(_)), "{err:?}");
    assert_eq!(h.saves.load(Ordering::SeqCst), RETRIES + 1);
    assert_eq!(h.stored_security(account.id).await, account.security);
}

#[tokio::test]
async fn unlock_under_endless_conflicts_leaves_the_lock_in_place() {
    let h = setup(Fault::Conflict).await;
    let until = Utc::now() + chrono::Duration::minutes(15);
    let account = h
        .account(SecurityState {
            failed_login_count: 5,
            account_locked: true,
            lockout_until: Some(until),
            last_failed_login_at: Some(Utc::now()),
        })
        .await;

    let err = h.service.admin_unlock_account(account.id).await.unwrap_err();
    assert!(matches!(err, AuthError::StoreUnavailable(_)), "{err:?}");

    let stored = h.stored_security(account.id).await;
    assert!(stored.account_locked);
    assert_eq!(stored.failed_login_count, 5);
    assert_eq!(stored.lockout_until, account.security.lockout_until);
}
