//! EdDSA bearer-token issuance and validation.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sclms_core::models::account::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims carried by every access token.
///
/// Role information lives in `extra` under `role` and `roles`, next to
/// whatever other claims the token carries. Unknown claims are kept, not
/// rejected, so tokens minted by older or newer issuers still validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: the account email.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub iss: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccessTokenClaims {
    /// The single `role` claim, or the first entry of `roles` when absent.
    pub fn primary_role(&self) -> Option<Role> {
        let from_role = self
            .extra
            .get("role")
            .and_then(Value::as_str)
            .and_then(parse_role);
        from_role.or_else(|| {
            self.extra
                .get("roles")
                .and_then(Value::as_array)
                .and_then(|roles| roles.iter().filter_map(Value::as_str).find_map(parse_role))
        })
    }

    pub fn account_uuid(&self) -> Option<Uuid> {
        self.account_id.as_deref().and_then(|id| Uuid::parse_str(id).ok())
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    raw.trim().trim_start_matches("ROLE_").parse().ok()
}

/// Issue a signed EdDSA (Ed25519) access token for `email`.
pub fn issue_access_token(
    email: &str,
    role: Role,
    account_id: Uuid,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let lifetime = i64::try_from(config.access_token_lifetime_secs).unwrap_or(i64::MAX);

    let mut extra = Map::new();
    extra.insert("role".into(), json!(role.as_str()));
    extra.insert("roles".into(), json!([role.as_str()]));

    let claims = AccessTokenClaims {
        sub: email.to_string(),
        account_id: Some(account_id.to_string()),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now.saturating_add(lifetime),
        jti: Uuid::new_v4().to_string(),
        extra,
    };

    encode_claims(&claims, config)
}

/// Sign arbitrary claims with the configured private key.
pub fn encode_claims(claims: &AccessTokenClaims, config: &AuthConfig) -> Result<String, AuthError> {
    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;

    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

fn decode_verified<T: serde::de::DeserializeOwned>(
    token: &str,
    config: &AuthConfig,
) -> Result<T, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.leeway = 0;
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_required_spec_claims(&["sub", "exp"]);

    jsonwebtoken::decode::<T>(token, &key, &validation).map(|data| data.claims)
}

/// Verify signature, issuer and expiry, and return the decoded claims.
///
/// No clock leeway is granted: a token is rejected with
/// [`AuthError::TokenExpired`] as soon as `exp` has passed. Tokens that
/// carry a `purpose` claim (second-factor challenges) are not access
/// tokens and are refused.
pub fn validate_access_token(
    token: &str,
    config: &AuthConfig,
) -> Result<AccessTokenClaims, AuthError> {
    let claims: AccessTokenClaims = decode_verified(token, config).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidKeyFormat => AuthError::Crypto(format!("bad public key: {e}")),
        _ => AuthError::TokenInvalid(e.to_string()),
    })?;

    if claims.extra.contains_key("purpose") {
        return Err(AuthError::TokenInvalid("not an access token".into()));
    }
    Ok(claims)
}

const TWO_FACTOR_PURPOSE: &str = "2fa";

/// How long a password-verified login may wait for its TOTP code.
pub const TWO_FACTOR_CHALLENGE_SECS: i64 = 300;

/// Claims of the short-lived token handed out between the password step
/// and the TOTP step of a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeClaims {
    /// Subject: the account id.
    pub sub: String,
    pub purpose: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Sign a second-factor challenge bound to `account_id`.
pub fn issue_two_factor_challenge(
    account_id: Uuid,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;
    let now = Utc::now().timestamp();

    let claims = ChallengeClaims {
        sub: account_id.to_string(),
        purpose: TWO_FACTOR_PURPOSE.into(),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now + TWO_FACTOR_CHALLENGE_SECS,
        jti: Uuid::new_v4().to_string(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Accept `token` only if it is an unexpired challenge for `account_id`.
/// Every failure, expiry included, is [`AuthError::InvalidChallenge`].
pub fn validate_two_factor_challenge(
    token: &str,
    account_id: Uuid,
    config: &AuthConfig,
) -> Result<(), AuthError> {
    let claims: ChallengeClaims = decode_verified(token, config).map_err(|e| match e.kind() {
        ErrorKind::InvalidKeyFormat => AuthError::Crypto(format!("bad public key: {e}")),
        _ => AuthError::InvalidChallenge,
    })?;

    if claims.purpose != TWO_FACTOR_PURPOSE || claims.sub != account_id.to_string() {
        return Err(AuthError::InvalidChallenge);
    }
    Ok(())
}
