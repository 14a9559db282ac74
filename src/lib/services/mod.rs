pub mod locks;
pub mod normalize;
pub mod services;
pub mod status;
pub mod types;

pub use locks::{ResourceGuard, ResourceLocks};
pub use normalize::{normalize_description, normalize_descriptions};
pub use services::ServiceManager;
pub use status::{Readiness, STEADY_STATE_MARKER, check_drained, check_ready, is_drained, readiness};
pub use types::{AppDefinition, ServiceDescriptor, ServiceStatus};
