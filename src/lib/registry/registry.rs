use std::sync::Arc;

use tracing::{debug, info, warn};

use super::naming::ResourceNaming;
use super::types::DeletionOutcome;
use crate::backend::{ClusterBackend, RawTaskDefinition};
use crate::deferred::{Deferred, require};
use crate::error::{ReconcileError, Result};
use crate::tasks::{SpecBuilder, TaskDefinitionHandle, TaskInput, TaskSpec};

/// Registers, inspects and removes revisioned task definitions.
pub struct TaskDefinitionRegistry {
    backend: Arc<dyn ClusterBackend>,
    builder: SpecBuilder,
    naming: ResourceNaming,
}

impl TaskDefinitionRegistry {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        builder: SpecBuilder,
        naming: ResourceNaming,
    ) -> Self {
        Self {
            backend,
            builder,
            naming,
        }
    }

    pub fn naming(&self) -> &ResourceNaming {
        &self.naming
    }

    /// Normalizes `task` without registering it.
    pub fn build(&self, task: impl Into<TaskInput>) -> Result<TaskSpec> {
        self.builder.build_task(task)
    }

    /// Normalizes `task` and registers it as the family's next revision.
    ///
    /// The spec is built before anything is returned, so malformed input
    /// fails with `InvalidSpec` without touching the backend.
    pub fn register(
        &self,
        task: impl Into<TaskInput>,
    ) -> Result<Deferred<'_, TaskDefinitionHandle>> {
        let spec = self.builder.build_task(task)?;

        Ok(Box::pin(async move {
            let raw = self.backend.register_task_definition(&spec).await?;
            let handle = TaskDefinitionHandle {
                family: raw.family.unwrap_or(spec.family),
                revision: raw.revision.ok_or_else(|| ReconcileError::Backend {
                    operation: "register_task_definition".into(),
                    message: "response carries no revision".into(),
                })?,
                arn: raw.task_definition_arn.unwrap_or_default(),
            };
            info!(
                family = %handle.family,
                revision = handle.revision,
                backend = self.backend.name(),
                "registered task definition"
            );
            Ok(handle)
        }))
    }

    /// Describes one definition. A failed lookup resolves to an inactive
    /// stand-in instead of an error.
    pub fn describe_one(&self, reference: &str) -> Result<Deferred<'_, RawTaskDefinition>> {
        require(reference, "describe_one requires a task definition reference")?;
        let reference = reference.to_string();

        Ok(Box::pin(async move { Ok(self.describe_or_inactive(&reference).await) }))
    }

    pub fn deregister(&self, reference: &str) -> Result<Deferred<'_, DeletionOutcome>> {
        require(reference, "deregister requires a task definition reference")?;
        let reference = reference.to_string();

        Ok(Box::pin(async move {
            self.backend.deregister_task_definition(&reference).await?;
            info!(%reference, "deregistered task definition");
            Ok(DeletionOutcome::Deleted)
        }))
    }

    /// Deregisters the definition only if it still describes as active.
    pub fn find_and_deregister(&self, reference: &str) -> Result<Deferred<'_, DeletionOutcome>> {
        require(
            reference,
            "find_and_deregister requires a task definition reference",
        )?;
        let reference = reference.to_string();

        Ok(Box::pin(async move {
            let described = self.describe_or_inactive(&reference).await;
            if !described.is_active() {
                debug!(%reference, "task definition already gone");
                return Ok(DeletionOutcome::AlreadyDeleted);
            }
            self.backend.deregister_task_definition(&reference).await?;
            info!(%reference, "deregistered task definition");
            Ok(DeletionOutcome::Deleted)
        }))
    }

    /// Every active definition ARN carrying the resource prefix.
    pub fn list(&self) -> Deferred<'_, Vec<String>> {
        Box::pin(async move {
            let arns = self.backend.list_task_definitions().await?;
            Ok(arns
                .into_iter()
                .filter(|arn| self.naming.is_managed(arn))
                .collect())
        })
    }

    pub fn list_families(&self) -> Deferred<'_, Vec<String>> {
        Box::pin(async move { Ok(self.backend.list_task_definition_families().await?) })
    }

    pub fn list_for_cluster(&self, cluster: &str) -> Result<Deferred<'_, Vec<String>>> {
        require(cluster, "list_for_cluster requires a cluster prefix")?;
        let cluster = cluster.to_string();

        Ok(self.list_matching(move |naming, arn| naming.belongs_to_cluster(arn, &cluster)))
    }

    pub fn list_for_request(
        &self,
        cluster: &str,
        request: &str,
    ) -> Result<Deferred<'_, Vec<String>>> {
        require(cluster, "list_for_request requires a cluster prefix")?;
        require(request, "list_for_request requires a request id")?;
        let (cluster, request) = (cluster.to_string(), request.to_string());

        Ok(self.list_matching(move |naming, arn| {
            naming.belongs_to_request(arn, &cluster, &request)
        }))
    }

    pub fn list_for_deployment(
        &self,
        cluster: &str,
        deployment: &str,
    ) -> Result<Deferred<'_, Vec<String>>> {
        require(cluster, "list_for_deployment requires a cluster prefix")?;
        require(deployment, "list_for_deployment requires a deployment id")?;
        let (cluster, deployment) = (cluster.to_string(), deployment.to_string());

        Ok(self.list_matching(move |naming, arn| {
            naming.belongs_to_deployment(arn, &cluster, &deployment)
        }))
    }

    fn list_matching<F>(&self, keep: F) -> Deferred<'_, Vec<String>>
    where
        F: Fn(&ResourceNaming, &str) -> bool + Send + 'static,
    {
        Box::pin(async move {
            let arns = self.list().await?;
            Ok(arns
                .into_iter()
                .filter(|arn| keep(&self.naming, arn.as_str()))
                .collect())
        })
    }

    async fn describe_or_inactive(&self, reference: &str) -> RawTaskDefinition {
        match self.backend.describe_task_definition(reference).await {
            Ok(described) => described,
            Err(err) => {
                warn!(%reference, error = %err, "describe failed, treating as inactive");
                RawTaskDefinition::inactive()
            }
        }
    }
}
