use async_trait::async_trait;
use thiserror::Error;

use super::types::{CreateServiceRequest, RawService, RawTaskDefinition, UpdateServiceRequest};
use crate::tasks::TaskSpec;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("{resource} not found")]
    NotFound {
        operation: &'static str,
        resource: String,
    },

    #[error("request rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("backend unavailable: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
}

impl BackendError {
    pub fn operation(&self) -> &'static str {
        match self {
            BackendError::NotFound { operation, .. }
            | BackendError::Rejected { operation, .. }
            | BackendError::Unavailable { operation, .. } => operation,
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The remote cluster-orchestration API, one method per remote call.
///
/// Implementations hold no reconciliation logic; they translate each call to
/// their transport and report results in the raw shapes of
/// [`super::types`].
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn register_task_definition(&self, spec: &TaskSpec) -> BackendResult<RawTaskDefinition>;

    /// `reference` is an ARN, `family:revision` or a bare family.
    async fn describe_task_definition(&self, reference: &str)
    -> BackendResult<RawTaskDefinition>;

    async fn deregister_task_definition(
        &self,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition>;

    /// ARNs of every active task definition revision.
    async fn list_task_definitions(&self) -> BackendResult<Vec<String>>;

    async fn list_task_definition_families(&self) -> BackendResult<Vec<String>>;

    async fn create_service(&self, request: &CreateServiceRequest) -> BackendResult<RawService>;

    /// Unknown services are left out of the result rather than failing it.
    async fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> BackendResult<Vec<RawService>>;

    async fn update_service(&self, request: &UpdateServiceRequest) -> BackendResult<RawService>;

    async fn delete_service(&self, cluster: &str, service: &str) -> BackendResult<RawService>;

    /// ARNs of every service on `cluster` that has not been deleted.
    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>>;
}
