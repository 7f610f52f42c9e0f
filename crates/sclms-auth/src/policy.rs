//! Password strength rules and policy-settings validation.

use sclms_core::models::policy::SecurityPolicy;
use thiserror::Error;

/// A password rule the candidate failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Password must be at least {min} characters long")]
    TooShort { min: u32 },
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one digit")]
    MissingDigit,
    #[error("Password must contain at least one special character")]
    MissingSpecialChar,
}

/// Check `password` against `policy`, returning the first failed rule.
///
/// Rules run in a fixed order: length, uppercase, digit, special
/// character. Length counts Unicode scalar values, not bytes.
pub fn validate_password(password: &str, policy: &SecurityPolicy) -> Result<(), PolicyViolation> {
    match violations(password, policy).into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

/// Every rule `password` fails, in check order.
pub fn violations(password: &str, policy: &SecurityPolicy) -> Vec<PolicyViolation> {
    let mut out = Vec::new();

    if password.chars().count() < policy.minimum_length as usize {
        out.push(PolicyViolation::TooShort {
            min: policy.minimum_length,
        });
    }
    if policy.require_uppercase && !password.chars().any(char::is_uppercase) {
        out.push(PolicyViolation::MissingUppercase);
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        out.push(PolicyViolation::MissingDigit);
    }
    if policy.require_special_char && !password.chars().any(|c| !c.is_alphanumeric()) {
        out.push(PolicyViolation::MissingSpecialChar);
    }

    out
}

/// Reject policy values that would disable lockout or make every
/// password acceptable.
pub fn validate_policy_settings(policy: &SecurityPolicy) -> Result<(), String> {
    if policy.minimum_length < 1 {
        return Err("minimum_length must be at least 1".into());
    }
    if policy.max_login_attempts < 1 {
        return Err("max_login_attempts must be at least 1".into());
    }
    if policy.lockout_duration_minutes < 1 {
        return Err("lockout_duration_minutes must be at least 1".into());
    }
    if policy.session_timeout_minutes < 1 {
        return Err("session_timeout_minutes must be at least 1".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> SecurityPolicy {
        SecurityPolicy {
            minimum_length: 8,
            require_uppercase: true,
            require_digit: true,
            require_special_char: true,
            ..SecurityPolicy::default()
        }
    }

    #[test]
    fn short_password_fails_on_length() {
        let policy = SecurityPolicy {
            minimum_length: 8,
            ..SecurityPolicy::default()
        };
        assert_eq!(
            validate_password("short", &policy),
            Err(PolicyViolation::TooShort { min: 8 })
        );
    }

    #[test]
    fn long_enough_password_with_upper_and_digit_passes() {
        let policy = SecurityPolicy {
            minimum_length: 8,
            require_uppercase: true,
            require_digit: true,
            require_special_char: false,
            ..SecurityPolicy::default()
        };
        assert_eq!(validate_password("LongEnough1", &policy), Ok(()));
    }

    #[test]
    fn first_failure_follows_check_order() {
        assert_eq!(
            validate_password("abc", &strict()),
            Err(PolicyViolation::TooShort { min: 8 })
        );
        assert_eq!(
            validate_password("abcdefgh", &strict()),
            Err(PolicyViolation::MissingUppercase)
        );
        assert_eq!(
            validate_password("Abcdefgh", &strict()),
            Err(PolicyViolation::MissingDigit)
        );
        assert_eq!(
            validate_password("Abcdefg1", &strict()),
            Err(PolicyViolation::MissingSpecialChar)
        );
        assert_eq!(validate_password("Abcdef1!", &strict()), Ok(()));
    }

    #[test]
    fn violations_lists_every_failed_rule() {
        assert_eq!(
            violations("abc", &strict()),
            vec![
                PolicyViolation::TooShort { min: 8 },
                PolicyViolation::MissingUppercase,
                PolicyViolation::MissingDigit,
                PolicyViolation::MissingSpecialChar,
            ]
        );
    }

    #[test]
    fn whitespace_counts_as_special() {
        assert_eq!(validate_password("Abcdef1 ", &strict()), Ok(()));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let policy = SecurityPolicy {
            minimum_length: 4,
            require_uppercase: false,
            require_digit: false,
            ..SecurityPolicy::default()
        };
        // Four characters, eight bytes.
        assert_eq!(validate_password("ünïç", &policy), Ok(()));
        assert!(validate_password("ünï", &policy).is_err());
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let policy = SecurityPolicy {
            minimum_length: 1,
            require_uppercase: false,
            require_digit: false,
            require_special_char: false,
            ..SecurityPolicy::default()
        };
        assert_eq!(validate_password("a", &policy), Ok(()));
    }

    #[test]
    fn violation_messages_name_the_rule() {
        assert_eq!(
            PolicyViolation::TooShort { min: 12 }.to_string(),
            "Password must be at least 12 characters long"
        );
        assert!(PolicyViolation::MissingDigit.to_string().contains("digit"));
    }

    #[test]
    fn policy_settings_reject_zero_thresholds() {
        assert!(validate_policy_settings(&SecurityPolicy::default()).is_ok());

        let zero_attempts = SecurityPolicy {
            max_login_attempts: 0,
            ..SecurityPolicy::default()
        };
        assert!(validate_policy_settings(&zero_attempts).is_err());

        let zero_length = SecurityPolicy {
            minimum_length: 0,
            ..SecurityPolicy::default()
        };
        assert!(validate_policy_settings(&zero_length).is_err());

        let zero_lockout = SecurityPolicy {
            lockout_duration_minutes: 0,
            ..SecurityPolicy::default()
        };
        assert!(validate_policy_settings(&zero_lockout).is_err());
    }
}
