//! Per-file transfer: download from the source, upload to the destination.
//!
//! Each step has its own [`RetryPolicy`]. Failures carry a
//! [`FailureCategory`](crate::job::FailureCategory) taken from the error that
//! ended the step.

mod fetcher;
mod pipeline;
mod types;

pub use fetcher::{HttpFetcher, SourceFetcher};
pub use pipeline::TransferPipeline;
pub use types::{
    RetryPolicy, TransferError, TransferFailure, TransferOptions, TransferStep, TransferSuccess,
};
