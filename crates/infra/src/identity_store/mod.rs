//! Identity and catalog storage backends.
//!
//! Both backends implement `IdentityStore` (the per-request read) and
//! `CatalogStore` (administrative writes) from `pipeops-auth`.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryIdentityStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIdentityStore;
