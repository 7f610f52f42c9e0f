//! SCLMS Auth: Password policy, account lockout, TOTP second factor,
//! bearer-token issuance/validation, and the login orchestration that
//! ties them together.

pub mod claims;
pub mod config;
pub mod error;
pub mod lockout;
pub mod password;
pub mod policy;
pub mod service;
pub mod token;
pub mod totp;

pub use claims::{Authorities, Principal};
pub use config::AuthConfig;
pub use error::AuthError;
pub use policy::PolicyViolation;
pub use service::{AuthService, ChangePasswordInput, LoginInput, LoginOutput, RegisterInput};
pub use token::AccessTokenClaims;
pub use totp::TotpEnrollment;
