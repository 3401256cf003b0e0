//! `pipeops-auth`: role-based authorization with live identity revalidation.
//!
//! Decoupled from HTTP and from any particular database: storage is reached
//! through `IdentityStore` / `CatalogStore`, transport through the guard's
//! return values.

pub mod catalog;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod error_page;
pub mod guard;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;

pub use catalog::{CatalogService, NewRole, NewUser, RoleUpdate};
pub use claims::{validate_claims, ClaimsValidationError, SessionClaims};
pub use credentials::{CredentialVerifier, VerifiedIdentity};
pub use error::{AuthError, CatalogError};
pub use error_page::{ErrorPage, ErrorQuery};
pub use guard::{AuthRedirect, AuthorizationGuard, Authorized, GuardDecision};
pub use password::{PasswordError, PasswordHasher};
pub use permissions::{Capabilities, Permission};
pub use policy::{capabilities_for, has_required_role, role_definitions, RoleDefinition, RoleTier};
pub use roles::{RequiredRole, RoleClaim, RoleName, DISPATCHER_ROLE, GUEST_ROLE};
pub use session::{IssuedToken, Refreshed, Session, SessionHydrator, TokenService};
pub use store::{
    CatalogStore, Identity, IdentityStore, PermissionRecord, RoleRecord, RoleTypeRecord, StoreError,
    UserRecord,
};
pub use token::{Hs256TokenCodec, TokenCodec, TokenError};
