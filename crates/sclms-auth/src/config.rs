//! Authentication configuration.

use std::time::Duration;

/// Configuration for the authentication service.
///
/// Password, lockout and two-factor thresholds are not here: they belong
/// to the [`SecurityPolicy`](sclms_core::models::policy::SecurityPolicy)
/// held by the policy store and can change at runtime.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for token signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for token verification.
    pub jwt_public_key_pem: String,
    /// Access token lifetime in seconds (default: 28_800 = 8 hours).
    pub access_token_lifetime_secs: u64,
    /// Token issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Accepted clock skew, in 30-second steps either side of now.
    pub totp_tolerance_steps: u8,
    /// 256-bit AES-GCM key for sealing TOTP secrets at rest.
    /// `None` stores secrets as plain base32.
    pub totp_encryption_key: Option<[u8; 32]>,
    /// Upper bound on any single account/policy store call.
    pub store_timeout: Duration,
    /// How many times a read-evaluate-commit cycle is retried when the
    /// account changed underneath it.
    pub max_update_retries: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 28_800,
            jwt_issuer: "sclms".into(),
            pepper: None,
            totp_issuer: "SCLMS".into(),
            totp_tolerance_steps: 1,
            totp_encryption_key: None,
            store_timeout: Duration::from_secs(5),
            max_update_retries: 5,
        }
    }
}
