pub mod naming;
pub mod registry;
pub mod types;

pub use naming::ResourceNaming;
pub use registry::TaskDefinitionRegistry;
pub use types::{ALREADY_DELETED, DELETED, DeletionOutcome};
