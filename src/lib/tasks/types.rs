use serde::{Deserialize, Serialize};

/// A validated container entry of a task specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Hard memory limit in MiB.
    pub memory: u32,
}

/// A validated task specification, ready to be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub family: String,
    pub containers: Vec<ContainerSpec>,
}

/// Loosely typed container input as it arrives from callers.
///
/// `memory` stays a raw JSON value so numeric strings and garbage can be
/// coerced by the builder instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialContainer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub memory: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainerInput {
    Name(String),
    Partial(PartialContainer),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialTask {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default, alias = "containerDefinitions")]
    pub containers: Vec<ContainerInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskInput {
    Family(String),
    Partial(PartialTask),
}

impl From<&str> for ContainerInput {
    fn from(name: &str) -> Self {
        ContainerInput::Name(name.to_string())
    }
}

impl From<ContainerSpec> for ContainerInput {
    fn from(spec: ContainerSpec) -> Self {
        ContainerInput::Partial(PartialContainer {
            name: Some(spec.name),
            image: Some(spec.image),
            memory: Some(spec.memory.into()),
        })
    }
}

impl From<&str> for TaskInput {
    fn from(family: &str) -> Self {
        TaskInput::Family(family.to_string())
    }
}

impl From<PartialTask> for TaskInput {
    fn from(partial: PartialTask) -> Self {
        TaskInput::Partial(partial)
    }
}

impl From<TaskSpec> for TaskInput {
    fn from(spec: TaskSpec) -> Self {
        TaskInput::Partial(PartialTask {
            family: Some(spec.family),
            containers: spec.containers.into_iter().map(Into::into).collect(),
        })
    }
}

/// Backend-issued identity of one registered revision of a task family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDefinitionHandle {
    pub family: String,
    pub revision: u32,
    pub arn: String,
}

impl TaskDefinitionHandle {
    /// `family:revision`, accepted anywhere an ARN is.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}
