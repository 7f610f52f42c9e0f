//! SCLMS Database: SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - [`AccountRepository`](sclms_core::repository::AccountRepository) and
//!   [`PolicyRepository`](sclms_core::repository::PolicyRepository)
//!   implementations in [`repository`]

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::run_migrations;
