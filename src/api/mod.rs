//! Local token endpoint.
//!
//! Serves the cached role and access token for the `(domain, role)` named in
//! the request headers. Reads never wait on a refresh in progress.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use handlers::{TokenResponse, DOMAIN_HEADER, ROLE_AUTH_HEADER, ROLE_HEADER};
pub use routes::{build_router, ApiState};
pub use server::TokenServer;
