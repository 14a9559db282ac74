//! r_fleet drives container services on a cluster toward a target state.
//!
//! Task specifications are normalized by [`tasks`], registered through the
//! [`registry`], bound to services by the [`services`] manager and then
//! observed by the [`poller`] until they settle. [`teardown`] runs the same
//! cycle in reverse for every service on a cluster.

pub mod api;
pub mod backend;
pub mod config;
pub mod deferred;
pub mod error;
pub mod poller;
pub mod registry;
pub mod services;
pub mod tasks;
pub mod teardown;

pub use deferred::Deferred;
pub use error::{ReconcileError, Result};
