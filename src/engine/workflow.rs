use async_trait::async_trait;

use crate::errors::Result;

/// A unit of refresh work driven by [`super::RefreshEngine`].
///
/// The engine guarantees that `run_cycle` is never called concurrently with
/// itself, that `on_start` runs once before the first scheduled cycle and
/// that `on_shutdown` runs at most once, after the last cycle.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Short name used in log lines and metric labels.
    fn name(&self) -> &'static str;

    /// One fetch-and-persist attempt. Errors are retried by the engine.
    async fn run_cycle(&self) -> Result<()>;

    /// Called once when the engine enters steady state. Errors are logged
    /// and the scheduler starts regardless.
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called once when the stop signal is observed. Errors are logged.
    async fn on_shutdown(&self) -> Result<()> {
        Ok(())
    }
}
