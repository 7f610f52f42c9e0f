//! TOTP generation, verification, and AES-256-GCM secret sealing.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;

/// A freshly generated shared secret and its authenticator-app URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotpEnrollment {
    /// Base32-encoded secret.
    pub secret: String,
    /// `otpauth://totp/...` URI for QR-code enrollment.
    pub provisioning_uri: String,
}

fn secret_bytes(secret_b32: &str) -> Result<Vec<u8>, AuthError> {
    Secret::Encoded(secret_b32.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e:?}")))
}

/// A verifier with zero built-in skew; tolerance is applied by the caller
/// so the matching step is known.
fn verifier(secret_b32: &str) -> Result<TOTP, AuthError> {
    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        DIGITS,
        0,
        STEP_SECS,
        secret_bytes(secret_b32)?,
        None,
        String::new(),
    ))
}

/// Generate a 160-bit secret and a provisioning URI labelled with
/// `issuer` and `account`.
pub fn generate_enrollment(issuer: &str, account: &str) -> Result<TotpEnrollment, AuthError> {
    let secret = Secret::generate_secret().to_encoded().to_string();
    enrollment_for(issuer, account, &secret)
}

/// Rebuild the enrollment for an existing base32 secret, e.g. one that
/// was generated earlier but never confirmed.
pub fn enrollment_for(
    issuer: &str,
    account: &str,
    secret_b32: &str,
) -> Result<TotpEnrollment, AuthError> {
    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        0,
        STEP_SECS,
        secret_bytes(secret_b32)?,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))?;

    Ok(TotpEnrollment {
        secret: secret_b32.to_string(),
        provisioning_uri: totp.get_url(),
    })
}

/// The code for the step containing `unix_secs`.
pub fn code_at(secret_b32: &str, unix_secs: u64) -> Result<String, AuthError> {
    Ok(verifier(secret_b32)?.generate(unix_secs))
}

/// Check `code` against the step containing `unix_secs` and up to
/// `tolerance` steps either side.
///
/// Returns the matched time step, which callers persist to refuse a
/// second use of the same code.
pub fn verify_code_at(
    secret_b32: &str,
    code: &str,
    tolerance: u8,
    unix_secs: u64,
) -> Result<Option<u64>, AuthError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let totp = verifier(secret_b32)?;
    let current = unix_secs / STEP_SECS;

    // Nearest steps first.
    let mut offsets = vec![0i64];
    for d in 1..=i64::from(tolerance) {
        offsets.push(-d);
        offsets.push(d);
    }

    for offset in offsets {
        let Some(step) = current.checked_add_signed(offset) else {
            continue;
        };
        if totp.check(code, step * STEP_SECS) {
            return Ok(Some(step));
        }
    }
    Ok(None)
}

pub fn verify_code(secret_b32: &str, code: &str, tolerance: u8) -> Result<Option<u64>, AuthError> {
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    verify_code_at(secret_b32, code, tolerance, now)
}

/// Encrypt a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() < 13 {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

/// Prepare a base32 secret for storage: encrypted when a key is
/// configured, unchanged otherwise.
pub fn seal_secret(key: Option<&[u8; 32]>, secret_b32: &str) -> Result<String, AuthError> {
    match key {
        Some(key) => encrypt_secret(key, secret_b32.as_bytes()),
        None => Ok(secret_b32.to_string()),
    }
}

/// Inverse of [`seal_secret`].
pub fn open_secret(key: Option<&[u8; 32]>, stored: &str) -> Result<String, AuthError> {
    match key {
        Some(key) => String::from_utf8(decrypt_secret(key, stored)?)
            .map_err(|e| AuthError::Crypto(format!("secret utf-8: {e}"))),
        None => Ok(stored.to_string()),
    }
}
