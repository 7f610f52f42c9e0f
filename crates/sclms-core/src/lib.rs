//! SCLMS Core: Domain models, repository traits, and shared error
//! types for the authentication and account-security core.

pub mod error;
pub mod models;
pub mod repository;
