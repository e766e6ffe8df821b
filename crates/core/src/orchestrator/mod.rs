//! Single-process job runner.
//!
//! Used for small jobs and whenever no sync worker is available. Produces the
//! same job counters, log lines and events as the distributed path.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::LocalOrchestrator;
pub use types::{LocalJob, OrchestratorError};
