//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must make
//! [`AccountRepository::save`] an atomic compare-and-swap so that
//! concurrent lockout transitions on one account cannot lose updates.

use uuid::Uuid;

use crate::error::SclmsResult;
use crate::models::account::{Account, CreateAccount};
use crate::models::policy::SecurityPolicy;

pub trait AccountRepository: Send + Sync {
    fn create(&self, input: CreateAccount) -> impl Future<Output = SclmsResult<Account>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = SclmsResult<Account>> + Send;
    /// Case-insensitive lookup.
    fn get_by_email(&self, email: &str) -> impl Future<Output = SclmsResult<Account>> + Send;
    fn exists_by_email(&self, email: &str) -> impl Future<Output = SclmsResult<bool>> + Send;
    /// Persist every mutable field of `account` if and only if the stored
    /// version still equals `account.version`.
    ///
    /// Returns the stored account with its bumped version, or
    /// [`SclmsError::Conflict`](crate::error::SclmsError::Conflict) when
    /// the snapshot is stale.
    fn save(&self, account: Account) -> impl Future<Output = SclmsResult<Account>> + Send;
}

pub trait PolicyRepository: Send + Sync {
    /// Returns the active policy, creating the default one if none exists.
    fn get_current(&self) -> impl Future<Output = SclmsResult<SecurityPolicy>> + Send;
    fn update(
        &self,
        policy: SecurityPolicy,
    ) -> impl Future<Output = SclmsResult<SecurityPolicy>> + Send;
}
