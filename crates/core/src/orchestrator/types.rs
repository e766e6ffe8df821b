//! Orchestrator types.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::destination::DestinationError;
use crate::job::FileDescriptor;

use super::config::OrchestratorConfig;

/// Errors raised before any file of a local run was attempted.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Destination(#[from] DestinationError),
}

/// A job to run in this process.
#[derive(Debug, Clone)]
pub struct LocalJob {
    pub job_id: String,
    pub account_id: String,
    pub files: Vec<FileDescriptor>,
    pub config: OrchestratorConfig,
}
