//! Infrastructure layer: identity store adapters.

pub mod identity_store;

pub use identity_store::InMemoryIdentityStore;
#[cfg(feature = "postgres")]
pub use identity_store::PostgresIdentityStore;
