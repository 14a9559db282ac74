//! The cluster-orchestration capability the engine drives.

pub mod backend;
pub mod docker;
pub mod memory;
pub mod table;
pub mod types;

pub use backend::{BackendError, BackendResult, ClusterBackend};
pub use docker::DockerBackend;
pub use memory::InMemoryBackend;
pub use types::{
    CreateServiceRequest, RawService, RawServiceEvent, RawTaskDefinition, ServicePatch,
    UpdateServiceRequest,
};
