use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tasks::ContainerSpec;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_DRAINING: &str = "DRAINING";
pub const STATUS_INACTIVE: &str = "INACTIVE";

/// Task definition exactly as a backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTaskDefinition {
    #[serde(default)]
    pub task_definition_arn: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub revision: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub container_definitions: Vec<ContainerSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawTaskDefinition {
    /// Stand-in returned when a definition cannot be described.
    pub fn inactive() -> Self {
        Self {
            status: Some(STATUS_INACTIVE.to_string()),
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.as_deref() != Some(STATUS_INACTIVE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServiceEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RawServiceEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            created_at: None,
            message: Some(message.into()),
        }
    }
}

/// Service description exactly as a backend reports it, newest event first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawService {
    #[serde(default)]
    pub service_arn: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default, alias = "cluster")]
    pub cluster_arn: Option<String>,
    #[serde(default)]
    pub task_definition: Option<String>,
    #[serde(default)]
    pub desired_count: Option<i64>,
    #[serde(default)]
    pub pending_count: Option<i64>,
    #[serde(default)]
    pub running_count: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deployments: Vec<Value>,
    #[serde(default)]
    pub events: Vec<RawServiceEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub cluster: String,
    pub service_name: String,
    pub task_definition: String,
    pub desired_count: u32,
}

/// Fields an update may change; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,
}

impl ServicePatch {
    pub fn desired_count(count: u32) -> Self {
        Self {
            desired_count: Some(count),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.desired_count.is_none() && self.task_definition.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub cluster: String,
    pub service: String,
    #[serde(flatten)]
    pub patch: ServicePatch,
}
