//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use sclms_auth::AuthConfig;
use sclms_db::DbConfig;

/// Every flag can also be set through its `SCLMS_*` environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "sclms-server", version, about = "SCLMS authentication server")]
pub struct ServerArgs {
    #[arg(long, env = "SCLMS_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// `mem://` for an embedded store, `ws://host:port` for a server.
    #[arg(long, env = "SCLMS_DB_URL", default_value = "mem://")]
    pub db_url: String,

    #[arg(long, env = "SCLMS_DB_NAMESPACE", default_value = "sclms")]
    pub db_namespace: String,

    #[arg(long, env = "SCLMS_DB_DATABASE", default_value = "main")]
    pub db_database: String,

    #[arg(long, env = "SCLMS_DB_USERNAME")]
    pub db_username: Option<String>,

    #[arg(long, env = "SCLMS_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// PEM file holding the Ed25519 private key used to sign tokens.
    #[arg(long, env = "SCLMS_JWT_PRIVATE_KEY")]
    pub jwt_private_key: PathBuf,

    /// PEM file holding the matching public key.
    #[arg(long, env = "SCLMS_JWT_PUBLIC_KEY")]
    pub jwt_public_key: PathBuf,

    #[arg(long, env = "SCLMS_JWT_ISSUER", default_value = "sclms")]
    pub jwt_issuer: String,

    #[arg(long, env = "SCLMS_TOKEN_LIFETIME_SECS", default_value_t = 28_800)]
    pub token_lifetime_secs: u64,

    #[arg(long, env = "SCLMS_PASSWORD_PEPPER", hide_env_values = true)]
    pub password_pepper: Option<String>,

    #[arg(long, env = "SCLMS_TOTP_ISSUER", default_value = "SCLMS")]
    pub totp_issuer: String,

    /// Accepted clock drift in 30-second steps either side of now.
    #[arg(long, env = "SCLMS_TOTP_TOLERANCE", default_value_t = 1)]
    pub totp_tolerance: u8,

    /// Base64 of 32 random bytes. Without it TOTP secrets are stored as
    /// plain base32.
    #[arg(long, env = "SCLMS_TOTP_ENCRYPTION_KEY", hide_env_values = true)]
    pub totp_encryption_key: Option<String>,

    #[arg(long, env = "SCLMS_STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    #[arg(long, env = "SCLMS_MAX_UPDATE_RETRIES", default_value_t = 8)]
    pub max_update_retries: u32,

    /// Create an administrator at start-up if none exists with the
    /// bootstrap email.
    #[arg(long, env = "SCLMS_BOOTSTRAP_ADMIN")]
    pub bootstrap_admin: bool,

    #[arg(long, env = "SCLMS_BOOTSTRAP_ADMIN_EMAIL", default_value = "admin@sclms.local")]
    pub bootstrap_admin_email: String,

    #[arg(long, env = "SCLMS_BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,

    #[arg(long, env = "SCLMS_BOOTSTRAP_ADMIN_NAME", default_value = "Administrator")]
    pub bootstrap_admin_name: String,
}

/// Credentials for the start-up administrator.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

pub fn decode_totp_key(encoded: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("TOTP encryption key is not valid base64")?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("TOTP encryption key must be 32 bytes, got {len}"))
}

impl ServerArgs {
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }

    /// Build the auth configuration, reading both key files.
    pub fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let jwt_private_key_pem = std::fs::read_to_string(&self.jwt_private_key)
            .with_context(|| format!("reading {}", self.jwt_private_key.display()))?;
        let jwt_public_key_pem = std::fs::read_to_string(&self.jwt_public_key)
            .with_context(|| format!("reading {}", self.jwt_public_key.display()))?;

        let totp_encryption_key = self
            .totp_encryption_key
            .as_deref()
            .map(decode_totp_key)
            .transpose()?;

        if self.max_update_retries == 0 {
            bail!("--max-update-retries must be at least 1");
        }

        Ok(AuthConfig {
            jwt_private_key_pem,
            jwt_public_key_pem,
            access_token_lifetime_secs: self.token_lifetime_secs,
            jwt_issuer: self.jwt_issuer.clone(),
            pepper: self.password_pepper.clone(),
            totp_issuer: self.totp_issuer.clone(),
            totp_tolerance_steps: self.totp_tolerance,
            totp_encryption_key,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            max_update_retries: self.max_update_retries,
        })
    }

    pub fn bootstrap(&self) -> anyhow::Result<Option<BootstrapAdmin>> {
        if !self.bootstrap_admin {
            return Ok(None);
        }
        let Some(password) = self.bootstrap_admin_password.clone() else {
            bail!("--bootstrap-admin needs SCLMS_BOOTSTRAP_ADMIN_PASSWORD");
        };
        Ok(Some(BootstrapAdmin {
            email: self.bootstrap_admin_email.clone(),
            password,
            name: self.bootstrap_admin_name.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> ServerArgs {
        let mut argv = vec![
            "sclms-server",
            "--jwt-private-key",
            "/keys/private.pem",
            "--jwt-public-key",
            "/keys/public.pem",
        ];
        argv.extend_from_slice(extra);
        ServerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(args.token_lifetime_secs, 28_800);
        assert_eq!(args.totp_tolerance, 1);

        let db = args.db_config();
        assert_eq!(db.url, "mem://");
        assert_eq!(db.namespace, "sclms");
        assert!(args.bootstrap().unwrap().is_none());
    }

    #[test]
    fn key_paths_are_required() {
        assert!(ServerArgs::try_parse_from(["sclms-server"]).is_err());
    }

    #[test]
    fn bootstrap_needs_a_password() {
        assert!(parse(&["--bootstrap-admin"]).bootstrap().is_err());

        let admin = parse(&["--bootstrap-admin", "--bootstrap-admin-password", "Secret123"])
            .bootstrap()
            .unwrap()
            .unwrap();
        assert_eq!(admin.email, "admin@sclms.local");
        assert_eq!(admin.password, "Secret123");
    }

    #[test]
    fn totp_key_must_be_32_bytes() {
        let key = STANDARD.encode([7u8; 32]);
        assert_eq!(decode_totp_key(&key).unwrap(), [7u8; 32]);
        assert!(decode_totp_key(&STANDARD.encode([7u8; 16])).is_err());
        assert!(decode_totp_key("***").is_err());
    }

    #[test]
    fn missing_key_file_is_reported() {
        let err = parse(&[]).auth_config().unwrap_err();
        assert!(err.to_string().contains("/keys/private.pem"));
    }
}
