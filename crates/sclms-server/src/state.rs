//! Shared application state.

use std::sync::Arc;

use sclms_auth::{AuthConfig, AuthService};
use sclms_db::repository::{SurrealAccountRepository, SurrealPolicyRepository};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;

pub type Auth = AuthService<SurrealAccountRepository<Any>, SurrealPolicyRepository<Any>>;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Auth>,
}

impl AppState {
    pub fn new(db: Surreal<Any>, config: AuthConfig) -> Self {
        let accounts = SurrealAccountRepository::new(db.clone());
        let policies = SurrealPolicyRepository::new(db);
        Self {
            auth: Arc::new(AuthService::new(accounts, policies, config)),
        }
    }
}
