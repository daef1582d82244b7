//! Token cache shared by the token workflow and the HTTP endpoint.

use std::sync::Arc;

use crate::domain::{AccessToken, RoleToken};
use crate::store::{KeyedStore, Lookup};

/// Both tokens for one `(domain, role)` pair, copied out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub role_token: String,
}

/// Latest role and access token per `(domain, role)`.
///
/// Constructed once per process and handed to both the refresh cycle and
/// the HTTP handler. Slots are only ever replaced, never removed.
#[derive(Debug, Default)]
pub struct TokenCache {
    role_tokens: KeyedStore<RoleToken>,
    access_tokens: KeyedStore<AccessToken>,
}

/// Owned snapshot of the cache, used to persist tokens to disk.
#[derive(Debug, Default)]
pub struct TokenSnapshot {
    pub role_tokens: Vec<Arc<RoleToken>>,
    pub access_tokens: Vec<Arc<AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_role_token(&self, token: RoleToken) {
        let (domain, role) = (token.domain.clone(), token.role.clone());
        self.role_tokens.insert(&domain, &role, token);
    }

    pub fn store_access_token(&self, token: AccessToken) {
        let (domain, role) = (token.domain.clone(), token.role.clone());
        self.access_tokens.insert(&domain, &role, token);
    }

    /// A domain is known once either token type was cached for it; a role
    /// is only found when both tokens are present.
    pub fn lookup(&self, domain: &str, role: &str) -> Lookup<TokenPair> {
        let access = self.access_tokens.get(domain, role);
        let role_token = self.role_tokens.get(domain, role);

        match (access, role_token) {
            (Lookup::Found(access), Lookup::Found(role_token)) => Lookup::Found(TokenPair {
                access_token: access.token.clone(),
                role_token: role_token.token.clone(),
            }),
            (Lookup::DomainNotFound, Lookup::DomainNotFound) => Lookup::DomainNotFound,
            _ => Lookup::RoleNotFound,
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            role_tokens: self.role_tokens.snapshot().into_iter().map(|(_, _, t)| t).collect(),
            access_tokens: self.access_tokens.snapshot().into_iter().map(|(_, _, t)| t).collect(),
        }
    }

    /// Number of populated token slots across both token types.
    pub fn len(&self) -> usize {
        self.role_tokens.len() + self.access_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
