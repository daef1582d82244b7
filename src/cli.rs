//! # Command Line Interface
//!
//! Process bootstrap: configuration, observability, provider wiring and the
//! refresh engines, then wait for a stop signal.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::TokenCache;
use crate::config::{IdentityConfig, ObservabilityConfig};
use crate::engine::{RefreshEngine, RefreshHandle};
use crate::observability::{init_observability, log_config_info};
use crate::provider::{IdentityHandler, ProviderClient};
use crate::workflows::{CertificateWorkflow, TokenWorkflow};
use crate::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "identityd")]
#[command(about = "Identity sidecar: keeps certificates and tokens fresh for the workload")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Workflows to run
    #[arg(long, value_enum, default_value_t = Mode::All, env = "IDENTITYD_MODE")]
    pub mode: Mode,

    /// Provision once and exit (overrides IDENTITYD_INIT)
    #[arg(long)]
    pub init: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Certificate,
    Token,
    All,
}

impl Mode {
    pub fn runs_certificate(self) -> bool {
        matches!(self, Mode::Certificate | Mode::All)
    }

    pub fn runs_token(self) -> bool {
        matches!(self, Mode::Token | Mode::All)
    }
}

/// Parse arguments and run
pub async fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse()).await
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut observability = ObservabilityConfig::from_env();
    if cli.verbose {
        observability.log_level = "debug".to_string();
    }
    init_observability(&observability)?;

    info!(app_name = APP_NAME, version = VERSION, mode = ?cli.mode, "Starting identity sidecar");

    let mut config = IdentityConfig::from_env().context("failed to load configuration")?;
    if cli.init {
        config.init = true;
    }
    config.validate().context("invalid configuration")?;
    log_config_info(&config);
    let config = Arc::new(config);

    let provider: Arc<dyn ProviderClient> = Arc::new(
        IdentityHandler::from_config(&config).await.context("failed to initialize identity provider")?,
    );

    let stop = CancellationToken::new();
    let mut handles: Vec<RefreshHandle> = Vec::new();

    // Certificates first: the token workflow authenticates with the files
    // the certificate workflow writes.
    if cli.mode.runs_certificate() {
        let workflow = CertificateWorkflow::new(config.clone(), provider.clone());
        let engine =
            RefreshEngine::new(Arc::new(workflow), CertificateWorkflow::engine_settings(&config));
        handles.push(engine.start(stop.clone()).await.context("certificate provisioning failed")?);
    }

    if cli.mode.runs_token() {
        let workflow = TokenWorkflow::new(config.clone(), provider.clone(), Arc::new(TokenCache::new()));
        let engine = RefreshEngine::new(Arc::new(workflow), TokenWorkflow::engine_settings(&config));
        handles.push(engine.start(stop.clone()).await.context("token provisioning failed")?);
    }

    if config.init {
        info!("Initial provisioning completed");
        return Ok(());
    }

    wait_for_signal().await;
    info!("Shutdown signal received");
    stop.cancel();

    for handle in handles {
        let name = handle.name();
        if let Err(e) = handle.join().await {
            error!(workflow = name, error = %e, "Workflow did not shut down cleanly");
        }
    }

    info!("Identity sidecar shutdown completed");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
