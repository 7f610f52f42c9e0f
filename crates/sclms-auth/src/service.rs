//! Authentication service: login, second factor, credential changes and
//! administrative account operations.
//!
//! Every account mutation follows the same cycle: load a snapshot, run a
//! pure decision over it, commit the resulting snapshot with a
//! compare-and-swap on `version`. When another request committed first,
//! the cycle starts over from a fresh read. Each store call is bounded
//! by `AuthConfig::store_timeout`.

use chrono::{DateTime, Utc};
use sclms_core::error::{SclmsError, SclmsResult};
use sclms_core::models::account::{
    Account, AccountStatus, AccountSummary, CreateAccount, Role, normalize_email,
};
use sclms_core::models::policy::SecurityPolicy;
use sclms_core::repository::{AccountRepository, PolicyRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::claims::{Principal, normalize_roles};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::lockout::{self, LockStatus};
use crate::password;
use crate::policy::{validate_password, validate_policy_settings};
use crate::token;
use crate::totp::{self, TotpEnrollment};

#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Successful login or second-factor completion.
#[derive(Debug)]
pub struct LoginOutput {
    /// Signed EdDSA bearer token.
    pub access_token: String,
    pub token_type: &'static str,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub account: AccountSummary,
}

#[derive(Debug)]
pub struct ChangePasswordInput {
    pub account_id: Uuid,
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub organization: Option<String>,
}

/// Outcome of one decision over an account snapshot.
struct Step<T> {
    /// Snapshot to commit before returning `outcome`.
    save: Option<Account>,
    outcome: Result<T, AuthError>,
}

impl<T> Step<T> {
    fn done(outcome: Result<T, AuthError>) -> Self {
        Self {
            save: None,
            outcome,
        }
    }

    fn commit(account: Account, outcome: Result<T, AuthError>) -> Self {
        Self {
            save: Some(account),
            outcome,
        }
    }

    /// Commit only if the snapshot differs from what was read.
    fn commit_if(changed: bool, account: Account, outcome: Result<T, AuthError>) -> Self {
        Self {
            save: changed.then_some(account),
            outcome,
        }
    }
}

/// Password verification that survives retries of a mutation cycle
/// without re-running Argon2 unless the stored hash changed.
struct PasswordCheck<'a> {
    password: &'a str,
    pepper: Option<&'a str>,
    cached: Option<(String, bool)>,
}

impl<'a> PasswordCheck<'a> {
    fn new(password: &'a str, pepper: Option<&'a str>) -> Self {
        Self {
            password,
            pepper,
            cached: None,
        }
    }

    fn matches(&mut self, hash: &str) -> Result<bool, AuthError> {
        if let Some((cached_hash, valid)) = &self.cached {
            if cached_hash == hash {
                return Ok(*valid);
            }
        }
        let valid = password::verify_password(self.password, hash, self.pepper)?;
        self.cached = Some((hash.to_string(), valid));
        Ok(valid)
    }
}

fn unix_secs(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or(0)
}

/// Error for a failed credential check, given the state it produced.
fn failure_error(next: &Account, now: DateTime<Utc>, otherwise: AuthError) -> AuthError {
    match next.security.lockout_until {
        Some(until) if next.security.account_locked => AuthError::AccountLocked {
            retry_after_minutes: lockout::retry_after_minutes(until, now),
        },
        _ => otherwise,
    }
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer has
/// no dependency on the database crate.
pub struct AuthService<A: AccountRepository, P: PolicyRepository> {
    accounts: A,
    policies: P,
    config: AuthConfig,
}

impl<A: AccountRepository, P: PolicyRepository> AuthService<A, P> {
    pub fn new(accounts: A, policies: P, config: AuthConfig) -> Self {
        Self {
            accounts,
            policies,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn timed<T>(&self, call: impl Future<Output = SclmsResult<T>>) -> SclmsResult<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SclmsError::Database("store call timed out".into())),
        }
    }

    async fn current_policy(&self) -> Result<SecurityPolicy, AuthError> {
        Ok(self.timed(self.policies.get_current()).await?)
    }

    async fn load(&self, account_id: Uuid) -> Result<Account, AuthError> {
        Ok(self.timed(self.accounts.get_by_id(account_id)).await?)
    }

    /// Run `decide` against `initial`, committing its snapshot. On a
    /// version conflict the account is re-read and `decide` runs again.
    async fn mutate<T, F>(&self, initial: Account, mut decide: F) -> Result<T, AuthError>
    where
        F: FnMut(Account) -> Step<T>,
    {
        let account_id = initial.id;
        let mut snapshot = Some(initial);

        for attempt in 0..=self.config.max_update_retries {
            let account = match snapshot.take() {
                Some(account) => account,
                None => self.load(account_id).await?,
            };

            let step = decide(account);
            if let Some(next) = step.save {
                match self.timed(self.accounts.save(next)).await {
                    Ok(_) => {}
                    Err(SclmsError::Conflict { .. }) => {
                        debug!(%account_id, attempt, "Account changed concurrently, retrying");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            return step.outcome;
        }

        warn!(%account_id, "Gave up after repeated concurrent updates");
        Err(AuthError::StoreUnavailable(
            "account is being updated concurrently".into(),
        ))
    }

    fn issue(&self, account: &Account) -> Result<LoginOutput, AuthError> {
        let access_token =
            token::issue_access_token(&account.email, account.role, account.id, &self.config)?;
        Ok(LoginOutput {
            access_token,
            token_type: "Bearer",
            expires_in: self.config.access_token_lifetime_secs,
            account: AccountSummary::from(account),
        })
    }

    fn open_secret(&self, stored: &str) -> Result<String, AuthError> {
        totp::open_secret(self.config.totp_encryption_key.as_ref(), stored)
    }

    fn new_enrollment(&self, account: &Account) -> Result<(TotpEnrollment, String), AuthError> {
        let enrollment = totp::generate_enrollment(&self.config.totp_issuer, &account.email)?;
        let key = self.config.totp_encryption_key.as_ref();
        let sealed = totp::seal_secret(key, &enrollment.secret)?;
        Ok((enrollment, sealed))
    }

    /// The enrollment to hand back when policy demands a second factor
    /// the account has not confirmed yet. An unconfirmed secret from an
    /// earlier attempt is reused so the authenticator app stays valid.
    fn pending_enrollment(&self, next: &mut Account) -> Result<TotpEnrollment, AuthError> {
        if let Some(stored) = &next.two_factor_secret {
            let secret = self.open_secret(stored)?;
            return totp::enrollment_for(&self.config.totp_issuer, &next.email, &secret);
        }
        let (enrollment, sealed) = self.new_enrollment(next)?;
        next.two_factor_secret = Some(sealed);
        next.last_totp_step = None;
        Ok(enrollment)
    }

    /// Checks that follow a successful credential, shared by password
    /// login and second-factor completion.
    fn post_credential_checks(
        account: &Account,
        policy: &SecurityPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if lockout::is_password_expired(account.password_changed_at, policy, now) {
            return Err(AuthError::PasswordExpired {
                account_id: account.id,
            });
        }
        if account.force_password_reset {
            return Err(AuthError::ForcedPasswordResetRequired {
                account_id: account.id,
            });
        }
        if account.status != AccountStatus::Approved {
            return Err(AuthError::AccountNotApproved);
        }
        Ok(())
    }

    /// Check `code` against the account's secret, refusing any time step
    /// at or before the last one accepted.
    fn accept_code(
        &self,
        account: &Account,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AuthError> {
        let Some(stored) = &account.two_factor_secret else {
            return Err(AuthError::TwoFactorNotEnrolled);
        };
        let secret = self.open_secret(stored)?;
        let tolerance = self.config.totp_tolerance_steps;
        let step = totp::verify_code_at(&secret, code, tolerance, unix_secs(now))?;
        Ok(step.filter(|s| account.last_totp_step.is_none_or(|last| *s > last)))
    }

    /// Authenticate with email and password.
    ///
    /// Steps run in a fixed order: lookup, lock check, password check
    /// (recording the failure), attempt reset, expiry, forced reset,
    /// approval, second factor, token issue. A token is only returned
    /// when every step passes; [`AuthError::ForcedPasswordResetRequired`]
    /// and [`AuthError::TwoFactorRequired`] are the two "continue
    /// elsewhere" outcomes.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutput, AuthError> {
        let email = normalize_email(&input.email);
        let account = match self.timed(self.accounts.get_by_email(&email)).await {
            Ok(account) => account,
            Err(SclmsError::NotFound { .. }) => {
                warn!(%email, "Login for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };
        let policy = self.current_policy().await?;
        let mut check = PasswordCheck::new(&input.password, self.config.pepper.as_deref());

        let account = self
            .mutate(account, |account| {
                let now = Utc::now();
                let (state, lock) = lockout::check(&account.security, now);
                if let LockStatus::Locked {
                    retry_after_minutes,
                } = lock
                {
                    info!(
                        account_id = %account.id,
                        retry_after_minutes,
                        "Login refused, account locked"
                    );
                    return Step::done(Err(AuthError::AccountLocked {
                        retry_after_minutes,
                    }));
                }
                let mut next = account.clone();
                if state != account.security {
                    info!(account_id = %account.id, "Lockout expired, account unlocked");
                    next.security = state;
                }

                let valid = match check.matches(&account.password_hash) {
                    Ok(valid) => valid,
                    Err(e) => return Step::done(Err(e)),
                };

                if !valid {
                    let failure = lockout::record_failure(&next.security, &policy, now);
                    next.security = failure.state;
                    if failure.locked {
                        warn!(
                            account_id = %account.id,
                            attempts = next.security.failed_login_count,
                            "Account locked after repeated failures"
                        );
                    } else {
                        info!(
                            account_id = %account.id,
                            attempts = next.security.failed_login_count,
                            "Failed login attempt recorded"
                        );
                    }
                    let err = failure_error(&next, now, AuthError::InvalidCredentials);
                    return Step::commit(next, Err(err));
                }

                next.security = lockout::record_success(&next.security);

                if let Err(e) = Self::post_credential_checks(&next, &policy, now) {
                    let changed = next.security != account.security;
                    return Step::commit_if(changed, next, Err(e));
                }

                if lockout::two_factor_required(&policy, next.two_factor_enabled) {
                    let enrollment = if next.two_factor_enabled && next.two_factor_secret.is_some()
                    {
                        None
                    } else {
                        match self.pending_enrollment(&mut next) {
                            Ok(enrollment) => Some(enrollment),
                            Err(e) => return Step::done(Err(e)),
                        }
                    };
                    debug!(
                        account_id = %account.id,
                        enrolling = enrollment.is_some(),
                        "Second factor required"
                    );
                    let challenge = match token::issue_two_factor_challenge(next.id, &self.config)
                    {
                        Ok(challenge) => challenge,
                        Err(e) => return Step::done(Err(e)),
                    };
                    let changed = next.security != account.security
                        || next.two_factor_secret != account.two_factor_secret;
                    return Step::commit_if(
                        changed,
                        next.clone(),
                        Err(AuthError::TwoFactorRequired {
                            account_id: next.id,
                            challenge,
                            enrollment,
                        }),
                    );
                }

                let changed = next.security != account.security;
                Step::commit_if(changed, next.clone(), Ok(next))
            })
            .await?;

        info!(account_id = %account.id, "Login succeeded");
        self.issue(&account)
    }

    /// Complete a login that returned [`AuthError::TwoFactorRequired`].
    ///
    /// `challenge` must be the token handed out by that login for the same
    /// account; without it nothing is read or recorded. Wrong codes count
    /// as failed attempts. The first valid code for a pending enrollment
    /// also enables two-factor on the account.
    pub async fn verify_two_factor(
        &self,
        account_id: Uuid,
        challenge: &str,
        code: &str,
    ) -> Result<LoginOutput, AuthError> {
        if let Err(e) = token::validate_two_factor_challenge(challenge, account_id, &self.config) {
            warn!(%account_id, "Second factor presented without a valid challenge");
            return Err(e);
        }
        let account = self.load(account_id).await?;
        let policy = self.current_policy().await?;

        let account = self
            .mutate(account, |account| {
                let now = Utc::now();
                let (state, lock) = lockout::check(&account.security, now);
                if let LockStatus::Locked {
                    retry_after_minutes,
                } = lock
                {
                    return Step::done(Err(AuthError::AccountLocked {
                        retry_after_minutes,
                    }));
                }
                if !lockout::two_factor_required(&policy, account.two_factor_enabled) {
                    return Step::done(Err(AuthError::TwoFactorNotEnrolled));
                }

                let mut next = account.clone();
                next.security = state;

                let step = match self.accept_code(&account, code, now) {
                    Ok(step) => step,
                    Err(e) => return Step::done(Err(e)),
                };
                let Some(step) = step else {
                    let failure = lockout::record_failure(&next.security, &policy, now);
                    next.security = failure.state;
                    warn!(
                        account_id = %account.id,
                        attempts = next.security.failed_login_count,
                        locked = failure.locked,
                        "Invalid second-factor code"
                    );
                    let err = failure_error(&next, now, AuthError::InvalidTwoFactorCode);
                    return Step::commit(next, Err(err));
                };

                next.last_totp_step = Some(step);
                next.security = lockout::record_success(&next.security);
                if !next.two_factor_enabled {
                    next.two_factor_enabled = true;
                    info!(account_id = %account.id, "Two-factor enrollment completed at login");
                }

                let outcome =
                    Self::post_credential_checks(&next, &policy, now).map(|()| next.clone());
                Step::commit(next, outcome)
            })
            .await?;

        info!(account_id = %account.id, "Second factor accepted");
        self.issue(&account)
    }

    /// Change a password. The current password is always required; a
    /// wrong one counts as a failed attempt.
    pub async fn change_password(&self, input: ChangePasswordInput) -> Result<(), AuthError> {
        let policy = self.current_policy().await?;
        validate_password(&input.new_password, &policy)?;
        let new_hash = password::hash_password(&input.new_password, self.config.pepper.as_deref())?;

        let mut check = PasswordCheck::new(&input.current_password, self.config.pepper.as_deref());
        let account = self.load(input.account_id).await?;
        self.mutate(account, |account| {
            let now = Utc::now();
            let (state, lock) = lockout::check(&account.security, now);
            if let LockStatus::Locked {
                retry_after_minutes,
            } = lock
            {
                return Step::done(Err(AuthError::AccountLocked {
                    retry_after_minutes,
                }));
            }
            let mut next = account.clone();
            next.security = state;

            let valid = match check.matches(&account.password_hash) {
                Ok(valid) => valid,
                Err(e) => return Step::done(Err(e)),
            };
            if !valid {
                let failure = lockout::record_failure(&next.security, &policy, now);
                next.security = failure.state;
                info!(account_id = %account.id, "Password change with wrong current password");
                let err = failure_error(&next, now, AuthError::InvalidCredentials);
                return Step::commit(next, Err(err));
            }

            next.password_hash = new_hash.clone();
            next.password_changed_at = Some(now);
            next.force_password_reset = false;
            next.security = lockout::record_success(&next.security);
            Step::commit(next, Ok(()))
        })
        .await?;

        info!(account_id = %input.account_id, "Password changed");
        Ok(())
    }

    /// Start (or restart) two-factor enrollment for an authenticated
    /// account. The secret is stored but not active until confirmed.
    pub async fn enroll_two_factor(&self, account_id: Uuid) -> Result<TotpEnrollment, AuthError> {
        let account = self.load(account_id).await?;
        let enrollment = self
            .mutate(account, |account| {
                if account.two_factor_enabled {
                    return Step::done(Err(AuthError::TwoFactorAlreadyEnabled));
                }
                let (enrollment, sealed) = match self.new_enrollment(&account) {
                    Ok(pair) => pair,
                    Err(e) => return Step::done(Err(e)),
                };
                let mut next = account;
                next.two_factor_secret = Some(sealed);
                next.last_totp_step = None;
                Step::commit(next, Ok(enrollment))
            })
            .await?;

        info!(%account_id, "Two-factor enrollment started");
        Ok(enrollment)
    }

    /// Activate a pending enrollment with a valid code.
    pub async fn confirm_two_factor(&self, account_id: Uuid, code: &str) -> Result<(), AuthError> {
        let account = self.load(account_id).await?;
        self.mutate(account, |account| {
            if account.two_factor_enabled {
                return Step::done(Err(AuthError::TwoFactorAlreadyEnabled));
            }
            match self.accept_code(&account, code, Utc::now()) {
                Ok(Some(step)) => {
                    let mut next = account;
                    next.two_factor_enabled = true;
                    next.last_totp_step = Some(step);
                    Step::commit(next, Ok(()))
                }
                Ok(None) => Step::done(Err(AuthError::InvalidTwoFactorCode)),
                Err(e) => Step::done(Err(e)),
            }
        })
        .await?;

        info!(%account_id, "Two-factor authentication enabled");
        Ok(())
    }

    /// Turn two-factor off. Needs the password and a current code, and is
    /// refused while policy mandates a second factor.
    pub async fn disable_two_factor(
        &self,
        account_id: Uuid,
        password_input: &str,
        code: &str,
    ) -> Result<(), AuthError> {
        let policy = self.current_policy().await?;
        if policy.two_factor_globally_required {
            return Err(AuthError::TwoFactorMandatory);
        }

        let mut check = PasswordCheck::new(password_input, self.config.pepper.as_deref());
        let account = self.load(account_id).await?;
        self.mutate(account, |account| {
            if !account.two_factor_enabled {
                return Step::done(Err(AuthError::TwoFactorNotEnrolled));
            }
            let now = Utc::now();
            let (state, lock) = lockout::check(&account.security, now);
            if let LockStatus::Locked {
                retry_after_minutes,
            } = lock
            {
                return Step::done(Err(AuthError::AccountLocked {
                    retry_after_minutes,
                }));
            }
            let mut next = account.clone();
            next.security = state;

            let password_ok = match check.matches(&account.password_hash) {
                Ok(valid) => valid,
                Err(e) => return Step::done(Err(e)),
            };
            let code_ok = match self.accept_code(&account, code, now) {
                Ok(step) => step.is_some(),
                Err(e) => return Step::done(Err(e)),
            };

            if !password_ok || !code_ok {
                let failure = lockout::record_failure(&next.security, &policy, now);
                next.security = failure.state;
                let otherwise = if password_ok {
                    AuthError::InvalidTwoFactorCode
                } else {
                    AuthError::InvalidCredentials
                };
                let err = failure_error(&next, now, otherwise);
                return Step::commit(next, Err(err));
            }

            next.two_factor_enabled = false;
            next.two_factor_secret = None;
            next.last_totp_step = None;
            next.security = lockout::record_success(&next.security);
            Step::commit(next, Ok(()))
        })
        .await?;

        info!(%account_id, "Two-factor authentication disabled");
        Ok(())
    }

    /// Clear lockout state unconditionally. Idempotent.
    pub async fn admin_unlock_account(
        &self,
        account_id: Uuid,
    ) -> Result<AccountSummary, AuthError> {
        let account = self.load(account_id).await?;
        let summary = self
            .mutate(account, |account| {
                let mut next = account.clone();
                next.security = lockout::unlock(&account.security);
                let changed = next.security != account.security;
                let summary = AccountSummary::from(&next);
                Step::commit_if(changed, next, Ok(summary))
            })
            .await?;

        info!(%account_id, "Account unlocked by administrator");
        Ok(summary)
    }

    /// Set a new password on behalf of the user. The account is unlocked
    /// and must pick its own password at next login.
    pub async fn admin_reset_password(
        &self,
        account_id: Uuid,
        new_password: &str,
    ) -> Result<AccountSummary, AuthError> {
        let policy = self.current_policy().await?;
        validate_password(new_password, &policy)?;
        let new_hash = password::hash_password(new_password, self.config.pepper.as_deref())?;

        let account = self.load(account_id).await?;
        let summary = self
            .mutate(account, |account| {
                let mut next = account.clone();
                next.password_hash = new_hash.clone();
                next.password_changed_at = Some(Utc::now());
                next.force_password_reset = true;
                next.security = lockout::unlock(&account.security);
                let summary = AccountSummary::from(&next);
                Step::commit(next, Ok(summary))
            })
            .await?;

        info!(%account_id, "Password reset by administrator");
        Ok(summary)
    }

    pub async fn get_policy(&self) -> Result<SecurityPolicy, AuthError> {
        self.current_policy().await
    }

    pub async fn update_policy(&self, policy: SecurityPolicy) -> Result<SecurityPolicy, AuthError> {
        validate_policy_settings(&policy).map_err(AuthError::InvalidPolicy)?;
        let updated = self.timed(self.policies.update(policy)).await?;
        info!(
            max_login_attempts = updated.max_login_attempts,
            lockout_duration_minutes = updated.lockout_duration_minutes,
            two_factor_globally_required = updated.two_factor_globally_required,
            "Security policy updated"
        );
        Ok(updated)
    }

    /// Create a pending USER account awaiting administrator approval.
    pub async fn register(&self, input: RegisterInput) -> Result<AccountSummary, AuthError> {
        let policy = self.current_policy().await?;
        validate_password(&input.password, &policy)?;

        let email = normalize_email(&input.email);
        if self.timed(self.accounts.exists_by_email(&email)).await? {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let pepper = self.config.pepper.as_deref();
        let password_hash = password::hash_password(&input.password, pepper)?;
        let account = self
            .timed(self.accounts.create(CreateAccount {
                email,
                name: input.name.trim().to_string(),
                organization: input.organization,
                role: Role::User,
                status: AccountStatus::Pending,
                password_hash,
                force_password_reset: false,
            }))
            .await?;

        info!(account_id = %account.id, "Account registered, pending approval");
        Ok(AccountSummary::from(&account))
    }

    /// Ensure an administrator account exists. Creates it (approved, and
    /// required to change its password at first login) when absent and
    /// leaves an existing account untouched. Returns whether it created one.
    pub async fn provision_admin(
        &self,
        email: &str,
        password_input: &str,
        name: &str,
    ) -> Result<bool, AuthError> {
        let email = normalize_email(email);
        if self.timed(self.accounts.exists_by_email(&email)).await? {
            info!(%email, "Bootstrap administrator already present");
            return Ok(false);
        }

        let policy = self.current_policy().await?;
        validate_password(password_input, &policy)?;
        let password_hash = password::hash_password(password_input, self.config.pepper.as_deref())?;

        let created = self
            .timed(self.accounts.create(CreateAccount {
                email: email.clone(),
                name: name.to_string(),
                organization: None,
                role: Role::Admin,
                status: AccountStatus::Approved,
                password_hash,
                force_password_reset: true,
            }))
            .await;

        match created {
            Ok(account) => {
                info!(account_id = %account.id, %email, "Bootstrap administrator created");
                Ok(true)
            }
            // Another instance won the race.
            Err(SclmsError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn profile(&self, account_id: Uuid) -> Result<AccountSummary, AuthError> {
        let account = self.load(account_id).await?;
        Ok(AccountSummary::from(&account))
    }

    /// Validate a bearer token and resolve it to a live account.
    ///
    /// The account is re-read on every call, so a deleted account is
    /// rejected even while its token is unexpired. Tokens are stateless,
    /// so issuance is the last activity they prove: one older than the
    /// policy's session timeout is refused as expired. Roles come from
    /// the token's claims, falling back to the stored role.
    pub async fn authenticate_token(&self, bearer: &str) -> Result<Principal, AuthError> {
        let claims = token::validate_access_token(bearer, &self.config)?;

        let policy = self.current_policy().await?;
        let issued_at = DateTime::from_timestamp(claims.iat, 0).unwrap_or_default();
        if lockout::is_session_idle(issued_at, &policy, Utc::now()) {
            debug!(sub = %claims.sub, "Token outlived the session timeout");
            return Err(AuthError::TokenExpired);
        }

        let account = match self.timed(self.accounts.get_by_email(&claims.sub)).await {
            Ok(account) => account,
            Err(SclmsError::NotFound { .. }) => return Err(AuthError::AccountNotFound),
            Err(e) => return Err(e.into()),
        };

        if let Some(id) = claims.account_uuid() {
            if id != account.id {
                return Err(AuthError::TokenInvalid("subject does not match account".into()));
            }
        }

        let authorities = normalize_roles(&claims.extra, Some(account.role));
        Ok(Principal {
            account,
            authorities,
        })
    }
}
