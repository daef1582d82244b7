//! Generic refresh engine.
//!
//! Both credential workflows share one lifecycle: an optional jittered
//! start, one retry-guarded cycle, then a periodic scheduler that runs
//! cycles one at a time until the stop signal arrives, at which point the
//! workflow's shutdown action runs once and the scheduler exits.
//!
//! ```text
//! STARTING --first cycle--> STEADY --stop--> DRAINING
//!     \--init only: return first cycle's result
//! ```

pub mod scheduler;
pub mod workflow;

pub use scheduler::{EngineSettings, EngineState, RefreshEngine, RefreshHandle};
pub use workflow::Workflow;
