pub mod builder;
pub mod types;

pub use builder::{MemoryPolicy, SpecBuilder};
pub use types::{
    ContainerInput, ContainerSpec, PartialContainer, PartialTask, TaskDefinitionHandle,
    TaskInput, TaskSpec,
};
