//! HTTP routes over the service manager and cluster teardown.

pub mod api;
pub mod types;

pub use types::{ApiError, AppState, DeployRequest, FleetServer};
