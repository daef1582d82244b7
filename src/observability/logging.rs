//! # Structured Logging

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{IdentityConfig, ObservabilityConfig};
use crate::errors::Result;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Installing twice is not an error; the first subscriber stays in place.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| crate::Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let installed = if config.json_logging {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).json().finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).finish(),
        )
    };

    if installed.is_err() {
        // Subscriber already set elsewhere (e.g. tests); ignore.
    }
    Ok(())
}

/// Log configuration at startup, including which optional steps are off.
pub fn log_config_info(config: &IdentityConfig) {
    tracing::info!(
        init = config.init,
        refresh = %humantime::format_duration(config.refresh),
        token_refresh = %humantime::format_duration(config.token_refresh),
        delay_jitter_seconds = config.delay_jitter_seconds,
        cert_file = %config.cert_file,
        key_file = %config.key_file,
        token_dir = %config.token_dir,
        targets = %config.targets_display(),
        backup = %config.backup,
        token_server_addr = %config.token_server_addr,
        "Identity sidecar configuration"
    );

    if !config.provider_enabled() {
        tracing::info!(
            provider_service = %config.provider_service,
            "Certificate provisioning is disabled with empty options"
        );
    }

    if !config.role_certs_enabled() {
        tracing::info!(
            targets = %config.targets_display(),
            role_cert_dir = %config.role_cert_dir,
            "Role certificate provisioning is disabled with empty options"
        );
    }
}
