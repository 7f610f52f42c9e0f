//! Credential and lockout state machine.
//!
//! Every function here is pure: it takes a [`SecurityState`] snapshot and
//! the current time and returns the next snapshot plus a decision. The
//! caller commits the new snapshot with a single compare-and-swap write,
//! so a counter increment and the lock it triggers land together or not
//! at all.

use chrono::{DateTime, Duration, Utc};
use sclms_core::models::account::SecurityState;
use sclms_core::models::policy::SecurityPolicy;

/// Whether a login attempt may proceed to the password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Open,
    Locked { retry_after_minutes: i64 },
}

/// Result of recording a failed credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    pub state: SecurityState,
    /// True when this failure crossed the attempt threshold.
    pub locked: bool,
}

/// Evaluate the lock before an attempt.
///
/// An expired lock is cleared (counter, expiry and last-failure reset)
/// and the returned state differs from the input; the caller must
/// persist it. A lock without an expiry stays in force until an
/// administrator unlocks the account.
pub fn check(state: &SecurityState, now: DateTime<Utc>) -> (SecurityState, LockStatus) {
    if !state.account_locked {
        return (state.clone(), LockStatus::Open);
    }

    match state.lockout_until {
        Some(until) if now >= until => (SecurityState::default(), LockStatus::Open),
        Some(until) => (
            state.clone(),
            LockStatus::Locked {
                retry_after_minutes: retry_after_minutes(until, now),
            },
        ),
        None => (
            state.clone(),
            LockStatus::Locked {
                retry_after_minutes: 0,
            },
        ),
    }
}

/// Count one failed attempt, locking once the policy threshold is reached.
pub fn record_failure(
    state: &SecurityState,
    policy: &SecurityPolicy,
    now: DateTime<Utc>,
) -> FailureOutcome {
    let failed_login_count = state.failed_login_count.saturating_add(1);
    let locked = failed_login_count >= policy.max_login_attempts;

    let lockout_until = if locked {
        Some(now + Duration::minutes(i64::from(policy.lockout_duration_minutes)))
    } else {
        None
    };

    FailureOutcome {
        state: SecurityState {
            failed_login_count,
            account_locked: locked,
            lockout_until,
            last_failed_login_at: Some(now),
        },
        locked,
    }
}

/// State after a correct password.
pub fn record_success(_state: &SecurityState) -> SecurityState {
    SecurityState::default()
}

/// Administrative unlock. Idempotent: the result is the same whether or
/// not the account was locked.
pub fn unlock(_state: &SecurityState) -> SecurityState {
    SecurityState::default()
}

/// Whole minutes until `until`, rounded up and never negative.
pub fn retry_after_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (until - now).num_seconds();
    if secs <= 0 { 0 } else { (secs + 59) / 60 }
}

/// Expired iff `changed_at + expiry_days < now`. An account that has
/// never recorded a password change never expires.
pub fn is_password_expired(
    changed_at: Option<DateTime<Utc>>,
    policy: &SecurityPolicy,
    now: DateTime<Utc>,
) -> bool {
    match changed_at {
        Some(changed) => changed + Duration::days(i64::from(policy.password_expiry_days)) < now,
        None => false,
    }
}

pub fn two_factor_required(policy: &SecurityPolicy, two_factor_enabled: bool) -> bool {
    policy.two_factor_globally_required || two_factor_enabled
}

/// True once more than `session_timeout_minutes` have passed since
/// `last_activity`.
pub fn is_session_idle(
    last_activity: DateTime<Utc>,
    policy: &SecurityPolicy,
    now: DateTime<Utc>,
) -> bool {
    now - last_activity > Duration::minutes(i64::from(policy.session_timeout_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SecurityPolicy {
        SecurityPolicy {
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
            ..SecurityPolicy::default()
        }
    }

    fn with_failures(n: u32) -> SecurityState {
        SecurityState {
            failed_login_count: n,
            ..SecurityState::default()
        }
    }

    #[test]
    fn failure_below_threshold_increments_by_one() {
        let now = Utc::now();
        for n in 0..4 {
            let outcome = record_failure(&with_failures(n), &policy(), now);
            assert_eq!(outcome.state.failed_login_count, n + 1);
            assert!(!outcome.locked);
            assert!(!outcome.state.account_locked);
            assert!(outcome.state.lockout_until.is_none());
            assert_eq!(outcome.state.last_failed_login_at, Some(now));
        }
    }

    #[test]
    fn threshold_failure_locks_for_policy_duration() {
        let now = Utc::now();
        let outcome = record_failure(&with_failures(4), &policy(), now);
        assert!(outcome.locked);
        assert!(outcome.state.account_locked);
        assert_eq!(outcome.state.failed_login_count, 5);
        assert_eq!(
            outcome.state.lockout_until,
            Some(now + Duration::minutes(15))
        );
    }

    #[test]
    fn single_attempt_policy_locks_immediately() {
        let p = SecurityPolicy {
            max_login_attempts: 1,
            ..policy()
        };
        assert!(record_failure(&SecurityState::default(), &p, Utc::now()).locked);
    }

    #[test]
    fn active_lock_rejects_without_touching_counter() {
        let now = Utc::now();
        let locked = record_failure(&with_failures(4), &policy(), now).state;

        let later = now + Duration::minutes(3);
        let (state, status) = check(&locked, later);
        assert_eq!(state, locked);
        assert_eq!(
            status,
            LockStatus::Locked {
                retry_after_minutes: 12
            }
        );
    }

    #[test]
    fn expired_lock_is_cleared() {
        let now = Utc::now();
        let locked = record_failure(&with_failures(4), &policy(), now).state;

        let (state, status) = check(&locked, now + Duration::minutes(15));
        assert_eq!(status, LockStatus::Open);
        assert_eq!(state, SecurityState::default());
    }

    #[test]
    fn lock_without_expiry_stays_locked() {
        let state = SecurityState {
            account_locked: true,
            ..SecurityState::default()
        };
        let (_, status) = check(&state, Utc::now());
        assert_eq!(
            status,
            LockStatus::Locked {
                retry_after_minutes: 0
            }
        );
    }

    #[test]
    fn unlocked_state_passes_through_unchanged() {
        let state = with_failures(2);
        let (next, status) = check(&state, Utc::now());
        assert_eq!(status, LockStatus::Open);
        assert_eq!(next, state);
    }

    #[test]
    fn success_and_unlock_reset_everything() {
        let locked = record_failure(&with_failures(4), &policy(), Utc::now()).state;
        assert_eq!(unlock(&locked), SecurityState::default());
        assert_eq!(unlock(&SecurityState::default()), SecurityState::default());
        assert_eq!(record_success(&with_failures(3)), SecurityState::default());
    }

    #[test]
    fn retry_after_rounds_up_and_clamps() {
        let now = Utc::now();
        assert_eq!(retry_after_minutes(now + Duration::seconds(1), now), 1);
        assert_eq!(retry_after_minutes(now + Duration::seconds(60), now), 1);
        assert_eq!(retry_after_minutes(now + Duration::seconds(61), now), 2);
        assert_eq!(retry_after_minutes(now, now), 0);
        assert_eq!(retry_after_minutes(now - Duration::minutes(5), now), 0);
    }

    #[test]
    fn password_expiry_boundary() {
        let now = Utc::now();
        let p = SecurityPolicy {
            password_expiry_days: 90,
            ..SecurityPolicy::default()
        };
        assert!(!is_password_expired(None, &p, now));
        assert!(!is_password_expired(Some(now - Duration::days(90)), &p, now));
        assert!(is_password_expired(
            Some(now - Duration::days(90) - Duration::seconds(1)),
            &p,
            now
        ));
        assert!(!is_password_expired(Some(now - Duration::days(10)), &p, now));
    }

    #[test]
    fn two_factor_required_by_policy_or_enrollment() {
        let mut p = SecurityPolicy::default();
        assert!(!two_factor_required(&p, false));
        assert!(two_factor_required(&p, true));
        p.two_factor_globally_required = true;
        assert!(two_factor_required(&p, false));
    }

    #[test]
    fn session_idle_after_timeout() {
        let now = Utc::now();
        let p = SecurityPolicy {
            session_timeout_minutes: 30,
            ..SecurityPolicy::default()
        };
        assert!(!is_session_idle(now - Duration::minutes(30), &p, now));
        assert!(is_session_idle(now - Duration::minutes(31), &p, now));
    }
}
