use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::workflow::Workflow;
use crate::backoff::{retry_notify, BackoffPolicy};
use crate::errors::{Error, Result};
use crate::observability::{CycleOutcome, RefreshMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Steady,
    /// Terminal; the shutdown action is running or has run.
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Period of the steady-state timer.
    pub interval: Duration,
    /// Startup delay is drawn from `[0, jitter_bound)` in whole seconds.
    pub jitter_bound: Duration,
    /// Run the first cycle only and report its outcome.
    pub init_only: bool,
    pub backoff: BackoffPolicy,
}

/// Drives one [`Workflow`] through its lifecycle.
pub struct RefreshEngine<W: Workflow> {
    workflow: Arc<W>,
    settings: EngineSettings,
    metrics: RefreshMetrics,
}

/// Control and completion handle for a started engine.
pub struct RefreshHandle {
    name: &'static str,
    trigger_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<EngineState>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Request an immediate refresh.
    ///
    /// Requests coalesce: while a cycle runs at most one more is queued.
    /// Returns `false` when nothing was queued.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait until the scheduler has drained. Returns at once in init mode.
    pub async fn join(self) -> Result<()> {
        match self.task {
            Some(task) => task
                .await
                .map_err(|e| Error::internal(format!("{} scheduler task failed: {}", self.name, e))),
            None => Ok(()),
        }
    }
}

impl<W: Workflow> RefreshEngine<W> {
    pub fn new(workflow: Arc<W>, settings: EngineSettings) -> Self {
        Self { workflow, settings, metrics: RefreshMetrics::new() }
    }

    /// Run the startup phase on the caller's task.
    ///
    /// In init-only mode the first cycle's result is returned and nothing is
    /// spawned. Otherwise a failed first cycle or a failed `on_start` is
    /// logged and the scheduler is spawned anyway; the returned handle
    /// observes it.
    pub async fn start(self, stop: CancellationToken) -> Result<RefreshHandle> {
        let name = self.workflow.name();
        let (state_tx, state_rx) = watch::channel(EngineState::Starting);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        self.startup_delay().await;

        let first = self.run_guarded().await;

        if self.settings.init_only {
            if let Err(e) = &first {
                error!(workflow = name, error = %e, "Failed to get initial credentials after multiple retries");
            }
            first?;
            return Ok(RefreshHandle { name, trigger_tx, state_rx, task: None });
        }

        if let Err(e) = first {
            error!(workflow = name, error = %e, "Failed to get initial credentials after multiple retries");
        }

        if let Err(e) = self.workflow.on_start().await {
            error!(workflow = name, error = %e, "Failed to start workflow services, refreshing anyway");
        }
        let _ = state_tx.send(EngineState::Steady);

        let task = tokio::spawn(self.run_scheduler(stop, trigger_rx, state_tx));
        Ok(RefreshHandle { name, trigger_tx, state_rx, task: Some(task) })
    }

    async fn startup_delay(&self) {
        let bound = self.settings.jitter_bound.as_secs();
        if bound == 0 {
            return;
        }
        let delay = Duration::from_secs(rand::thread_rng().gen_range(0..bound));
        info!(
            workflow = self.workflow.name(),
            delay = %humantime::format_duration(delay),
            bound = %humantime::format_duration(self.settings.jitter_bound),
            "Delaying boot with jitter"
        );
        tokio::time::sleep(delay).await;
    }

    async fn run_scheduler(
        self,
        stop: CancellationToken,
        mut trigger_rx: mpsc::Receiver<()>,
        state_tx: watch::Sender<EngineState>,
    ) {
        let name = self.workflow.name();
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            info!(workflow = name, interval = %humantime::format_duration(period), "Next refresh scheduled");

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
                Some(()) = trigger_rx.recv() => {
                    info!(workflow = name, "Manual refresh requested");
                }
            }

            if let Err(e) = self.run_guarded().await {
                error!(workflow = name, error = %e, "Failed to refresh credentials after multiple retries");
            }
        }

        let _ = state_tx.send(EngineState::Draining);
        info!(workflow = name, "Stop signal received, draining");

        match self.workflow.on_shutdown().await {
            Ok(()) => info!(workflow = name, "Shutdown complete"),
            Err(e) => error!(workflow = name, error = %e, "Shutdown action failed"),
        }
    }

    /// One cycle under the backoff policy.
    async fn run_guarded(&self) -> Result<()> {
        let workflow: &W = &self.workflow;
        let name = workflow.name();
        let started = Instant::now();

        let result = retry_notify(
            self.settings.backoff,
            move || workflow.run_cycle(),
            |err: &Error, delay| {
                warn!(
                    workflow = name,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Refresh cycle failed, retrying"
                );
            },
        )
        .await;

        let outcome = if result.is_ok() { CycleOutcome::Success } else { CycleOutcome::Exhausted };
        self.metrics.record_cycle(name, outcome, started.elapsed());
        result
    }
}
