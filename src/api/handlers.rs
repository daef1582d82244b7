use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{error::ApiError, routes::ApiState};
use crate::store::Lookup;

pub const DOMAIN_HEADER: &str = "x-athenz-domain";
pub const ROLE_HEADER: &str = "x-athenz-role";
/// Response header carrying the role token.
pub const ROLE_AUTH_HEADER: &str = "yahoo-role-auth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub accesstoken: String,
    pub roletoken: String,
}

/// Return both cached tokens for the requested `(domain, role)`.
///
/// The body and the `Authorization` / `Yahoo-Role-Auth` headers carry the
/// same values.
pub async fn token_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let domain = header_str(&headers, DOMAIN_HEADER);
    let role = header_str(&headers, ROLE_HEADER);

    if domain.is_empty() || role.is_empty() {
        state.metrics.record_token_request("missing_headers");
        return Err(ApiError::BadRequest(format!(
            "http headers not set: X-Athenz-Domain[{}] X-Athenz-Role[{}].",
            domain, role
        )));
    }

    let pair = match state.cache.lookup(domain, role) {
        Lookup::Found(pair) => pair,
        Lookup::DomainNotFound => {
            state.metrics.record_token_request("domain_not_found");
            return Err(ApiError::NotFound(format!("domain[{}] was not found in cache.", domain)));
        }
        Lookup::RoleNotFound => {
            state.metrics.record_token_request("role_not_found");
            return Err(ApiError::NotFound(format!(
                "domain[{}] role[{}] was not found in cache.",
                domain, role
            )));
        }
    };

    let authorization = HeaderValue::from_str(&format!("bearer {}", pair.access_token))
        .map_err(|_| ApiError::Internal("access token is not a valid header value".into()))?;
    let role_auth = HeaderValue::from_str(&pair.role_token)
        .map_err(|_| ApiError::Internal("role token is not a valid header value".into()))?;

    state.metrics.record_token_request("success");
    debug!(domain, role, "Served cached tokens");

    let mut response =
        Json(TokenResponse { accesstoken: pair.access_token, roletoken: pair.role_token })
            .into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::AUTHORIZATION, authorization);
    response_headers.insert(ROLE_AUTH_HEADER, role_auth);
    Ok(response)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim).unwrap_or_default()
}
