//! SurrealDB implementations of the core repository traits.

mod account;
mod policy;

pub use account::SurrealAccountRepository;
pub use policy::SurrealPolicyRepository;
