//! Role tokens and access tokens.

use std::fmt;

use chrono::{DateTime, Utc};

use super::role::DomainRole;

/// A signed role token for one `(domain, role)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct RoleToken {
    pub domain: String,
    pub role: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// An OAuth2 access token for one `(domain, role)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub domain: String,
    pub role: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleToken {
    pub fn new(target: &DomainRole, token: impl Into<String>) -> Self {
        Self {
            domain: target.domain.clone(),
            role: target.role.clone(),
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn target(&self) -> DomainRole {
        DomainRole::new(&self.domain, &self.role)
    }
}

impl AccessToken {
    pub fn new(target: &DomainRole, token: impl Into<String>) -> Self {
        Self {
            domain: target.domain.clone(),
            role: target.role.clone(),
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn target(&self) -> DomainRole {
        DomainRole::new(&self.domain, &self.role)
    }
}

// Token strings are bearer credentials; keep them out of Debug output.
impl fmt::Debug for RoleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleToken")
            .field("domain", &self.domain)
            .field("role", &self.role)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("domain", &self.domain)
            .field("role", &self.role)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
