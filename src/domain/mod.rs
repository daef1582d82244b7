//! Domain layer
//!
//! Credential types handled by the refresh workflows. These types carry no
//! infrastructure dependencies beyond PEM parsing for observability.
//!
//! ## Module Organization
//!
//! - `role`: `(domain, role)` authorization pair and target list parsing
//! - `identity`: instance identity certificates and role certificates
//! - `token`: role tokens and access tokens

pub mod identity;
pub mod role;
pub mod token;

pub use identity::{InstanceIdentity, RoleCertificate};
pub use role::{DomainRole, DomainRoleParseError};
pub use token::{AccessToken, RoleToken};
