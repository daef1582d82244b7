//! # Metrics Collection
//!
//! Refresh-cycle and token-endpoint metrics. Recording is a no-op until a
//! recorder is installed, so the workflows record unconditionally.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    /// The retry budget ran out.
    Exhausted,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Exhausted => "exhausted",
        }
    }
}

/// Metrics emitted by the refresh workflows and the token endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshMetrics;

impl RefreshMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_cycle(&self, workflow: &'static str, outcome: CycleOutcome, duration: Duration) {
        counter!("identityd_cycles_total", "workflow" => workflow, "outcome" => outcome.as_str())
            .increment(1);
        histogram!("identityd_cycle_duration_seconds", "workflow" => workflow)
            .record(duration.as_secs_f64());
    }

    /// Where the identity of a certificate cycle came from.
    pub fn record_credential_source(&self, source: &'static str) {
        counter!("identityd_credential_source_total", "source" => source).increment(1);
    }

    pub fn record_token_request(&self, outcome: &'static str) {
        counter!("identityd_token_requests_total", "outcome" => outcome).increment(1);
    }

    pub fn set_cached_tokens(&self, count: usize) {
        gauge!("identityd_cached_tokens").set(count as f64);
    }

    fn describe(&self) {
        describe_counter!("identityd_cycles_total", "Refresh cycles by workflow and outcome");
        describe_histogram!(
            "identityd_cycle_duration_seconds",
            Unit::Seconds,
            "Duration of a refresh cycle including retries"
        );
        describe_counter!(
            "identityd_credential_source_total",
            "Identity source chosen by certificate cycles"
        );
        describe_counter!("identityd_token_requests_total", "Token endpoint requests by outcome");
        describe_gauge!("identityd_cached_tokens", "Token slots held in the cache");
    }
}

/// Install the Prometheus exporter when a metrics port is configured.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    RefreshMetrics::new().describe();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics collection initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = RefreshMetrics::new();
        metrics.record_cycle("certificate", CycleOutcome::Success, Duration::from_millis(12));
        metrics.record_credential_source("provider");
        metrics.record_token_request("found");
        metrics.set_cached_tokens(4);
    }

    #[test]
    fn test_disabled_metrics_skip_exporter() {
        let config = ObservabilityConfig { enable_metrics: false, metrics_port: 9102, ..Default::default() };
        assert!(init_metrics(&config).is_ok());

        let config = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CycleOutcome::Success.as_str(), "success");
        assert_eq!(CycleOutcome::Exhausted.as_str(), "exhausted");
    }
}
