pub mod teardown;

pub use teardown::{ClusterTeardown, ServiceFailure, TeardownPolicy, TeardownReport};
