//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the caller, from a JWT Bearer token.
//! - [`rbac::RequireAuth`] -- any authenticated user.
//! - [`rbac::RequireAdmin`] -- the `admin` role.

pub mod auth;
pub mod rbac;
