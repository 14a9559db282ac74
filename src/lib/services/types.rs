use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::types::{STATUS_ACTIVE, STATUS_DRAINING, STATUS_INACTIVE};
use crate::tasks::TaskInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Active,
    Draining,
    Inactive,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => STATUS_ACTIVE,
            ServiceStatus::Draining => STATUS_DRAINING,
            ServiceStatus::Inactive => STATUS_INACTIVE,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATUS_ACTIVE => Ok(ServiceStatus::Active),
            STATUS_DRAINING => Ok(ServiceStatus::Draining),
            STATUS_INACTIVE => Ok(ServiceStatus::Inactive),
            other => Err(format!("unknown service status {other}")),
        }
    }
}

/// Normalized view of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service_ref: String,
    pub service_name: String,
    pub task_definition_ref: String,
    pub cluster_ref: String,
    pub desired_count: u32,
    pub pending_count: u32,
    pub running_count: u32,
    pub status: ServiceStatus,
    pub deployments: Vec<Value>,
    pub last_event_message: Option<String>,
    /// Event messages, newest first.
    pub events: Vec<String>,
}

/// A set of tasks deployed together onto one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(default)]
    pub tasks: Option<Vec<TaskInput>>,
}

impl AppDefinition {
    pub fn new(tasks: Vec<TaskInput>) -> Self {
        Self { tasks: Some(tasks) }
    }
}
