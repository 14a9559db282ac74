use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use super::locks::ResourceLocks;
use super::normalize::{normalize_description, normalize_descriptions};
use super::status::{check_drained, check_ready};
use super::types::{AppDefinition, ServiceDescriptor, ServiceStatus};
use crate::backend::{
    ClusterBackend, CreateServiceRequest, RawService, ServicePatch, UpdateServiceRequest,
};
use crate::deferred::{Deferred, require};
use crate::error::{ReconcileError, Result};
use crate::poller::Poller;
use crate::registry::{DeletionOutcome, TaskDefinitionRegistry};
use crate::tasks::TaskInput;

const DEFAULT_DESIRED_COUNT: u32 = 1;

/// Creates, inspects, scales and removes services on a cluster.
///
/// Public operations validate their arguments up front and return a
/// [`Deferred`]; the backend is only called once that future is awaited.
pub struct ServiceManager {
    backend: Arc<dyn ClusterBackend>,
    registry: Arc<TaskDefinitionRegistry>,
    poller: Poller,
    locks: ResourceLocks,
}

impl ServiceManager {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        registry: Arc<TaskDefinitionRegistry>,
        poller: Poller,
    ) -> Self {
        Self {
            backend,
            registry,
            poller,
            locks: ResourceLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TaskDefinitionRegistry> {
        &self.registry
    }

    /// Creates a service running one copy of `task_definition`.
    pub fn create(
        &self,
        cluster: &str,
        service_name: &str,
        task_definition: &str,
    ) -> Result<Deferred<'_, ServiceDescriptor>> {
        let request = create_request("create", cluster, service_name, task_definition)?;
        Ok(Box::pin(async move { self.create_service(&request).await }))
    }

    /// Returns the existing service when it already runs `task_definition`,
    /// otherwise creates it.
    ///
    /// Calls for the same `(cluster, service_name)` are serialized, so two
    /// concurrent callers never both create.
    pub fn find_or_create(
        &self,
        cluster: &str,
        service_name: &str,
        task_definition: &str,
    ) -> Result<Deferred<'_, ServiceDescriptor>> {
        let request = create_request("find_or_create", cluster, service_name, task_definition)?;
        Ok(Box::pin(async move { self.find_or_create_service(&request).await }))
    }

    /// Registers `task`, creates a service for it and waits until it is ready.
    pub fn create_task_and_service(
        &self,
        cluster: &str,
        service_name: &str,
        task: impl Into<TaskInput>,
    ) -> Result<Deferred<'_, ServiceDescriptor>> {
        require(cluster, "create_task_and_service requires a cluster")?;
        require(service_name, "create_task_and_service requires a service name")?;
        let registration = self.registry.register(task)?;
        let (cluster, service_name) = (cluster.to_string(), service_name.to_string());

        Ok(Box::pin(async move {
            let handle = registration.await?;
            let created = self
                .create_service(&CreateServiceRequest {
                    cluster: cluster.clone(),
                    service_name,
                    task_definition: handle.reference(),
                    desired_count: DEFAULT_DESIRED_COUNT,
                })
                .await?;

            let mut ready = self
                .wait_until_ready(&cluster, vec![created.service_ref])
                .await?;
            Ok(ready.swap_remove(0))
        }))
    }

    /// Runs [`Self::create_task_and_service`] for every task of `app`
    /// concurrently; the first failure fails the whole deployment.
    ///
    /// A single-task app uses `service_name` as is. With several tasks each
    /// service is named `<service_name>-<family>`, so two tasks of the same
    /// family are rejected.
    pub fn create_all_for_cluster(
        &self,
        cluster: &str,
        service_name: &str,
        app: &AppDefinition,
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        require(cluster, "create_all_for_cluster requires a cluster")?;
        require(service_name, "create_all_for_cluster requires a service name")?;
        let tasks = app.tasks.as_ref().ok_or_else(|| {
            ReconcileError::InvalidArgument(
                "create_all_for_cluster requires app definition tasks".into(),
            )
        })?;

        let single = tasks.len() == 1;
        let mut names = HashSet::new();
        let deployments = tasks
            .iter()
            .map(|task| {
                let spec = self.registry.build(task.clone())?;
                let name = if single {
                    service_name.to_string()
                } else {
                    format!("{service_name}-{}", spec.family)
                };
                if !names.insert(name.clone()) {
                    return Err(ReconcileError::InvalidArgument(format!(
                        "app deploys service {name} more than once"
                    )));
                }
                self.create_task_and_service(cluster, &name, spec)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(cluster, services = deployments.len(), "deploying app");
        Ok(Box::pin(try_join_all(deployments)))
    }

    pub fn describe_many(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        validate_refs("describe_many", cluster, services)?;
        let (cluster, services) = (cluster.to_string(), services.to_vec());

        Ok(Box::pin(async move { self.describe(&cluster, &services).await }))
    }

    pub fn describe_all(&self, cluster: &str) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        require(cluster, "describe_all requires a cluster")?;
        let cluster = cluster.to_string();

        Ok(Box::pin(async move {
            let services = self.backend.list_services(&cluster).await?;
            if services.is_empty() {
                return Ok(Vec::new());
            }
            self.describe(&cluster, &services).await
        }))
    }

    /// References of every live service on `cluster`.
    pub fn list(&self, cluster: &str) -> Result<Deferred<'_, Vec<String>>> {
        require(cluster, "list requires a cluster")?;
        let cluster = cluster.to_string();

        Ok(Box::pin(async move {
            Ok(self.backend.list_services(&cluster).await?)
        }))
    }

    pub fn update(
        &self,
        cluster: &str,
        service: &str,
        patch: ServicePatch,
    ) -> Result<Deferred<'_, ServiceDescriptor>> {
        require(cluster, "update requires a cluster")?;
        require(service, "update requires a service")?;
        if patch.is_empty() {
            return Err(ReconcileError::InvalidArgument(
                "update requires at least one field to change".into(),
            ));
        }
        let request = UpdateServiceRequest {
            cluster: cluster.to_string(),
            service: service.to_string(),
            patch,
        };

        Ok(Box::pin(async move { self.update_service(&request).await }))
    }

    /// Scales the service to zero tasks.
    pub fn stop(&self, cluster: &str, service: &str) -> Result<Deferred<'_, ServiceDescriptor>> {
        self.update(cluster, service, ServicePatch::desired_count(0))
    }

    pub fn destroy(&self, cluster: &str, service: &str) -> Result<Deferred<'_, DeletionOutcome>> {
        require(cluster, "destroy requires a cluster")?;
        require(service, "destroy requires a service")?;
        let (cluster, service) = (cluster.to_string(), service.to_string());

        Ok(Box::pin(async move { self.destroy_service(&cluster, &service).await }))
    }

    /// Destroys the service if it still exists.
    pub fn find_and_destroy(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Deferred<'_, DeletionOutcome>> {
        require(cluster, "find_and_destroy requires a cluster")?;
        require(service, "find_and_destroy requires a service")?;
        let (cluster, service) = (cluster.to_string(), service.to_string());

        Ok(Box::pin(async move {
            let _guard = self.locks.acquire(&cluster, &service).await;
            let found = self
                .describe(&cluster, std::slice::from_ref(&service))
                .await?
                .into_iter()
                .any(|s| s.status != ServiceStatus::Inactive);
            if !found {
                debug!(%cluster, %service, "service already gone");
                return Ok(DeletionOutcome::AlreadyDeleted);
            }
            self.destroy_service(&cluster, &service).await
        }))
    }

    /// Scales the service down and deletes it without waiting for it to drain.
    pub fn stop_and_destroy(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Deferred<'_, DeletionOutcome>> {
        require(cluster, "stop_and_destroy requires a cluster")?;
        require(service, "stop_and_destroy requires a service")?;
        let request = UpdateServiceRequest {
            cluster: cluster.to_string(),
            service: service.to_string(),
            patch: ServicePatch::desired_count(0),
        };

        Ok(Box::pin(async move {
            self.update_service(&request).await?;
            self.destroy_service(&request.cluster, &request.service)
                .await
        }))
    }

    /// Describes once and succeeds only if the first service is ready.
    pub fn resolve_if_ready(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        validate_refs("resolve_if_ready", cluster, services)?;
        let (cluster, services) = (cluster.to_string(), services.to_vec());

        Ok(Box::pin(async move {
            check_ready(self.describe(&cluster, &services).await?)
        }))
    }

    /// Describes once and succeeds only if every service is inactive.
    pub fn resolve_if_drained(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        validate_refs("resolve_if_drained", cluster, services)?;
        let (cluster, services) = (cluster.to_string(), services.to_vec());

        Ok(Box::pin(async move {
            check_drained(self.describe(&cluster, &services).await?)
        }))
    }

    pub fn wait_for_ready(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        validate_refs("wait_for_ready", cluster, services)?;
        Ok(self.wait_until_ready(cluster, services.to_vec()))
    }

    pub fn wait_for_drained(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Deferred<'_, Vec<ServiceDescriptor>>> {
        validate_refs("wait_for_drained", cluster, services)?;
        let cluster = cluster.to_string();
        let services = services.to_vec();
        let label = format!("drain of {} on {cluster}", services.join(", "));

        Ok(self.poller.wait_for(label, move || {
            let (cluster, services) = (cluster.clone(), services.clone());
            async move { check_drained(self.describe(&cluster, &services).await?) }
        }))
    }

    fn wait_until_ready(
        &self,
        cluster: &str,
        services: Vec<String>,
    ) -> Deferred<'_, Vec<ServiceDescriptor>> {
        let cluster = cluster.to_string();
        let label = format!("readiness of {} on {cluster}", services.join(", "));

        self.poller.wait_for(label, move || {
            let (cluster, services) = (cluster.clone(), services.clone());
            async move { check_ready(self.describe(&cluster, &services).await?) }
        })
    }

    async fn describe(
        &self,
        cluster: &str,
        services: &[String],
    ) -> Result<Vec<ServiceDescriptor>> {
        let raws = self.backend.describe_services(cluster, services).await?;
        Ok(normalize_descriptions(raws, cluster))
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> Result<ServiceDescriptor> {
        let raw = self.backend.create_service(request).await?;
        info!(
            cluster = %request.cluster,
            service = %request.service_name,
            task_definition = %request.task_definition,
            backend = self.backend.name(),
            "created service"
        );
        descriptor("create_service", raw, &request.cluster)
    }

    async fn find_or_create_service(
        &self,
        request: &CreateServiceRequest,
    ) -> Result<ServiceDescriptor> {
        let _guard = self
            .locks
            .acquire(&request.cluster, &request.service_name)
            .await;

        let existing = self
            .describe(&request.cluster, std::slice::from_ref(&request.service_name))
            .await?
            .into_iter()
            .find(|s| {
                s.status != ServiceStatus::Inactive
                    && s.task_definition_ref == request.task_definition
            });
        if let Some(service) = existing {
            debug!(
                cluster = %request.cluster,
                service = %request.service_name,
                "service already runs the requested task definition"
            );
            return Ok(service);
        }
        self.create_service(request).await
    }

    async fn update_service(&self, request: &UpdateServiceRequest) -> Result<ServiceDescriptor> {
        let raw = self.backend.update_service(request).await?;
        info!(
            cluster = %request.cluster,
            service = %request.service,
            desired_count = ?request.patch.desired_count,
            task_definition = ?request.patch.task_definition,
            "updated service"
        );
        descriptor("update_service", raw, &request.cluster)
    }

    async fn destroy_service(&self, cluster: &str, service: &str) -> Result<DeletionOutcome> {
        self.backend.delete_service(cluster, service).await?;
        info!(cluster, service, "deleted service");
        Ok(DeletionOutcome::Deleted)
    }
}

fn create_request(
    operation: &str,
    cluster: &str,
    service_name: &str,
    task_definition: &str,
) -> Result<CreateServiceRequest> {
    require(cluster, &format!("{operation} requires a cluster"))?;
    require(service_name, &format!("{operation} requires a service name"))?;
    require(task_definition, &format!("{operation} requires a task definition"))?;
    Ok(CreateServiceRequest {
        cluster: cluster.to_string(),
        service_name: service_name.to_string(),
        task_definition: task_definition.to_string(),
        desired_count: DEFAULT_DESIRED_COUNT,
    })
}

fn validate_refs(operation: &str, cluster: &str, services: &[String]) -> Result<()> {
    require(cluster, &format!("{operation} requires a cluster"))?;
    if services.is_empty() {
        return Err(ReconcileError::InvalidArgument(format!(
            "{operation} requires at least one service"
        )));
    }
    Ok(())
}

fn descriptor(operation: &str, raw: RawService, cluster: &str) -> Result<ServiceDescriptor> {
    normalize_description(raw, cluster).ok_or_else(|| ReconcileError::Backend {
        operation: operation.to_string(),
        message: "malformed service description".into(),
    })
}
