//! `(domain, role)` pairs.
//!
//! Targets are configured as a comma-separated list in the
//! `<domain>:role.<role>` notation, e.g.
//! `sys.auth:role.readers,media.prod:role.writers`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ROLE_SEPARATOR: &str = ":role.";

/// A single authorization target: a role inside a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainRole {
    pub domain: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainRoleParseError {
    #[error("target '{0}' is not in <domain>:role.<role> form")]
    MissingSeparator(String),

    #[error("target '{0}' has an empty domain or role")]
    EmptyComponent(String),
}

impl DomainRole {
    pub fn new(domain: impl Into<String>, role: impl Into<String>) -> Self {
        Self { domain: domain.into(), role: role.into() }
    }

    /// File name stem shared by role certificates and token files.
    pub fn file_stem(&self) -> String {
        format!("{}{}{}", self.domain, ROLE_SEPARATOR, self.role)
    }

    /// Parse a comma-separated target list.
    ///
    /// Blank entries are ignored and duplicates collapse onto their first
    /// occurrence so each pair is requested once.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, DomainRoleParseError> {
        let mut targets: Vec<Self> = Vec::new();
        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let target = entry.parse::<Self>()?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }
}

impl FromStr for DomainRole {
    type Err = DomainRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, role) = s
            .split_once(ROLE_SEPARATOR)
            .ok_or_else(|| DomainRoleParseError::MissingSeparator(s.to_string()))?;

        if domain.trim().is_empty() || role.trim().is_empty() {
            return Err(DomainRoleParseError::EmptyComponent(s.to_string()));
        }

        Ok(Self::new(domain.trim(), role.trim()))
    }
}

impl fmt::Display for DomainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}
