//! # Configuration Settings
//!
//! Defines the configuration structures for the identity sidecar.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::DomainRole;
use crate::errors::{Error, Result};
use crate::provider::ZtsConfig;
use crate::secrets::VaultConfig;

/// Prefix of every environment variable read by [`IdentityConfig::from_env`].
pub const ENV_PREFIX: &str = "IDENTITYD_";

/// Which directions of the identity backup are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMode {
    pub read: bool,
    pub write: bool,
}

impl BackupMode {
    /// Accepts `read`, `write`, `read,write` or an empty string. Any value
    /// mentioning a direction enables it.
    pub fn parse(value: &str) -> Self {
        let value = value.to_ascii_lowercase();
        Self { read: value.contains("read"), write: value.contains("write") }
    }

    pub fn is_enabled(&self) -> bool {
        self.read || self.write
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => write!(f, "read,write"),
            (true, false) => write!(f, "read"),
            (false, true) => write!(f, "write"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// Settings shared by both refresh workflows. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct IdentityConfig {
    /// Run one cycle and exit instead of refreshing in the background.
    pub init: bool,

    /// Certificate refresh interval; also sizes the retry budget.
    pub refresh: Duration,

    pub token_refresh: Duration,

    /// Upper bound (exclusive) of the startup delay, in seconds. 0 disables.
    pub delay_jitter_seconds: u64,

    #[validate(length(min = 1, message = "Key file path cannot be empty"))]
    pub key_file: String,

    #[validate(length(min = 1, message = "Certificate file path cannot be empty"))]
    pub cert_file: String,

    #[validate(length(min = 1, message = "CA certificate file path cannot be empty"))]
    pub ca_cert_file: String,

    /// Output directory for role certificates; empty disables them.
    pub role_cert_dir: String,

    #[validate(length(min = 1, message = "Token directory cannot be empty"))]
    pub token_dir: String,

    /// `(domain, role)` pairs to request role certificates and tokens for.
    pub target_domain_roles: Vec<DomainRole>,

    /// Provider service used to register the instance; empty disables
    /// certificate issuance.
    pub provider_service: String,

    /// Identity provider base URL.
    pub zts_url: String,

    pub domain: String,
    pub service: String,
    pub dns_suffix: String,
    pub attestation_path: String,
    pub zts_ca_cert_file: String,

    /// Name of the backup secret; empty disables the backup.
    pub cert_secret: String,

    pub backup: BackupMode,

    /// Delete the provider-side instance record on shutdown.
    pub delete_instance_id: bool,

    #[validate(length(min = 1, message = "Token server address cannot be empty"))]
    pub token_server_addr: String,

    /// Lifetime requested for role certificates and tokens.
    pub token_expiry: Duration,

    /// How long the token server may drain on shutdown.
    pub shutdown_grace: Duration,

    pub provider_timeout: Duration,

    /// Vault connection for the backup secret.
    pub vault: Option<VaultConfig>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            init: false,
            refresh: Duration::from_secs(24 * 60 * 60),
            token_refresh: Duration::from_secs(30 * 60),
            delay_jitter_seconds: 0,
            key_file: "/var/run/athenz/service.key.pem".to_string(),
            cert_file: "/var/run/athenz/service.cert.pem".to_string(),
            ca_cert_file: "/var/run/athenz/ca.cert.pem".to_string(),
            role_cert_dir: String::new(),
            token_dir: "/var/run/athenz".to_string(),
            target_domain_roles: Vec::new(),
            provider_service: String::new(),
            zts_url: String::new(),
            domain: String::new(),
            service: String::new(),
            dns_suffix: String::new(),
            attestation_path: String::new(),
            zts_ca_cert_file: String::new(),
            cert_secret: String::new(),
            backup: BackupMode::default(),
            delete_instance_id: false,
            token_server_addr: "127.0.0.1:8880".to_string(),
            token_expiry: Duration::from_secs(2 * 60 * 60),
            shutdown_grace: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(30),
            vault: None,
        }
    }
}

impl IdentityConfig {
    /// Load from `IDENTITYD_*` environment variables (and `VAULT_*` for the
    /// backup backend). Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.vault = VaultConfig::from_env();
        Ok(config)
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let defaults = Self::default();

        let target_domain_roles = match var("TARGET_DOMAIN_ROLES") {
            Some(raw) => DomainRole::parse_list(&raw)
                .map_err(|e| Error::config(format!("Invalid IDENTITYD_TARGET_DOMAIN_ROLES: {}", e)))?,
            None => defaults.target_domain_roles,
        };

        let delay_jitter_seconds = match var("DELAY_JITTER_SECONDS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Error::config(format!("Invalid IDENTITYD_DELAY_JITTER_SECONDS: {}", e))
            })?,
            None => defaults.delay_jitter_seconds,
        };

        Ok(Self {
            init: var("INIT").map(|s| parse_bool(&s)).unwrap_or(defaults.init),
            refresh: duration_var(&var, "REFRESH", defaults.refresh)?,
            token_refresh: duration_var(&var, "TOKEN_REFRESH", defaults.token_refresh)?,
            delay_jitter_seconds,
            key_file: var("KEY_FILE").unwrap_or(defaults.key_file),
            cert_file: var("CERT_FILE").unwrap_or(defaults.cert_file),
            ca_cert_file: var("CA_CERT_FILE").unwrap_or(defaults.ca_cert_file),
            role_cert_dir: var("ROLE_CERT_DIR").unwrap_or(defaults.role_cert_dir),
            token_dir: var("TOKEN_DIR").unwrap_or(defaults.token_dir),
            target_domain_roles,
            provider_service: var("PROVIDER_SERVICE").unwrap_or(defaults.provider_service),
            zts_url: var("ZTS_URL").unwrap_or(defaults.zts_url),
            domain: var("DOMAIN").unwrap_or(defaults.domain),
            service: var("SERVICE").unwrap_or(defaults.service),
            dns_suffix: var("DNS_SUFFIX").unwrap_or(defaults.dns_suffix),
            attestation_path: var("ATTESTATION_PATH").unwrap_or(defaults.attestation_path),
            zts_ca_cert_file: var("ZTS_CA_CERT_FILE").unwrap_or(defaults.zts_ca_cert_file),
            cert_secret: var("CERT_SECRET").unwrap_or(defaults.cert_secret),
            backup: var("BACKUP").map(|s| BackupMode::parse(&s)).unwrap_or(defaults.backup),
            delete_instance_id: var("DELETE_INSTANCE_ID")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.delete_instance_id),
            token_server_addr: var("TOKEN_SERVER_ADDR").unwrap_or(defaults.token_server_addr),
            token_expiry: duration_var(&var, "TOKEN_EXPIRY", defaults.token_expiry)?,
            shutdown_grace: duration_var(&var, "SHUTDOWN_GRACE", defaults.shutdown_grace)?,
            provider_timeout: duration_var(&var, "PROVIDER_TIMEOUT", defaults.provider_timeout)?,
            vault: defaults.vault,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.refresh.is_zero() {
            return Err(Error::config("Refresh interval must be greater than zero"));
        }

        if self.token_refresh.is_zero() {
            return Err(Error::config("Token refresh interval must be greater than zero"));
        }

        if self.backup.is_enabled() && self.cert_secret.trim().is_empty() {
            return Err(Error::config(format!(
                "Backup mode '{}' requires IDENTITYD_CERT_SECRET",
                self.backup
            )));
        }

        if !self.provider_service.is_empty() && self.zts_url.trim().is_empty() {
            return Err(Error::config("IDENTITYD_PROVIDER_SERVICE requires IDENTITYD_ZTS_URL"));
        }

        Ok(())
    }

    pub fn provider_enabled(&self) -> bool {
        !self.provider_service.is_empty()
    }

    pub fn has_targets(&self) -> bool {
        !self.target_domain_roles.is_empty()
    }

    /// Role certificates need both targets and an output directory.
    pub fn role_certs_enabled(&self) -> bool {
        self.has_targets() && !self.role_cert_dir.is_empty()
    }

    pub fn backup_read_enabled(&self) -> bool {
        self.backup.read && !self.cert_secret.is_empty()
    }

    pub fn backup_write_enabled(&self) -> bool {
        self.backup.write && !self.cert_secret.is_empty()
    }

    pub fn role_cert_path(&self, target: &DomainRole) -> PathBuf {
        PathBuf::from(&self.role_cert_dir).join(format!("{}.cert.pem", target.file_stem()))
    }

    pub fn access_token_path(&self, target: &DomainRole) -> PathBuf {
        PathBuf::from(&self.token_dir).join(format!("{}.accesstoken", target.file_stem()))
    }

    pub fn role_token_path(&self, target: &DomainRole) -> PathBuf {
        PathBuf::from(&self.token_dir).join(format!("{}.roletoken", target.file_stem()))
    }

    /// Provider client settings, `None` when no provider URL is configured.
    pub fn zts_config(&self) -> Option<ZtsConfig> {
        if self.zts_url.trim().is_empty() {
            return None;
        }
        Some(ZtsConfig {
            url: self.zts_url.clone(),
            provider_service: self.provider_service.clone(),
            domain: self.domain.clone(),
            service: self.service.clone(),
            dns_suffix: self.dns_suffix.clone(),
            attestation_path: non_empty_path(&self.attestation_path),
            ca_cert_file: non_empty_path(&self.zts_ca_cert_file),
            token_expiry: self.token_expiry,
            timeout: self.provider_timeout,
        })
    }

    /// Comma-separated target list, for log lines.
    pub fn targets_display(&self) -> String {
        self.target_domain_roles.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    pub enable_metrics: bool,

    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: true,
            metrics_port: 0,
            service_name: "identityd".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let defaults = Self::default();

        Self {
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: var("JSON_LOGS").map(|s| parse_bool(&s)).unwrap_or(defaults.json_logging),
            enable_metrics: var("ENABLE_METRICS")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.enable_metrics),
            metrics_port: var("METRICS_PORT")
                .and_then(|s| s.trim().parse::<u16>().ok())
                .unwrap_or(defaults.metrics_port),
            service_name: var("SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Parses `"30m"`, `"1h 30m"`, `"5s"`; a bare number is seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("Invalid duration '{}': {}", value, e)))
}

fn duration_var<F>(var: &F, name: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => parse_duration(&raw)
            .map_err(|e| Error::config(format!("Invalid {}{}: {}", ENV_PREFIX, name, e))),
        None => Ok(default),
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}
