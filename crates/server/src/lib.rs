//! HTTP surface of skymover.

pub mod api;
pub mod metrics;
pub mod state;
