use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    models::{ContainerSummary, HostConfig, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{BackendError, BackendResult, ClusterBackend};
use super::table::TaskDefinitionTable;
use super::types::{
    CreateServiceRequest, RawService, RawServiceEvent, RawTaskDefinition, STATUS_ACTIVE,
    STATUS_INACTIVE, UpdateServiceRequest,
};
use crate::tasks::TaskSpec;

const LABEL_CLUSTER: &str = "r_fleet.cluster";
const LABEL_SERVICE: &str = "r_fleet.service";
const LABEL_TASK_DEFINITION: &str = "r_fleet.task_definition";

/// Runs each service as one labelled container on the local Docker daemon.
///
/// Docker has no task definition registry, so revisions live in process
/// memory. Removed containers leave an `INACTIVE` tombstone behind so callers
/// can observe that a service drained.
pub struct DockerBackend {
    client: Docker,
    task_definitions: Mutex<TaskDefinitionTable>,
    tombstones: Mutex<HashMap<(String, String), RawService>>,
}

impl DockerBackend {
    pub fn connect() -> BackendResult<Self> {
        let client = Docker::connect_with_local_defaults().map_err(docker_error("connect"))?;

        Ok(DockerBackend {
            client,
            task_definitions: Mutex::new(TaskDefinitionTable::new("arn:fleet:docker")),
            tombstones: Mutex::new(HashMap::new()),
        })
    }

    async fn pull_image(&self, image: &str) -> BackendResult<()> {
        info!(image, "pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(image, %status, "pull progress");
                    }
                }
                Err(e) => {
                    warn!(image, error = %e, "image pull failed");
                    return Err(docker_error("create_service")(e));
                }
            }
        }

        Ok(())
    }

    async fn containers(
        &self,
        operation: &'static str,
        cluster: &str,
    ) -> BackendResult<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{LABEL_CLUSTER}={cluster}")],
        );

        self.client
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(docker_error(operation))
    }

    async fn find_container(
        &self,
        operation: &'static str,
        cluster: &str,
        service: &str,
    ) -> BackendResult<ContainerSummary> {
        self.containers(operation, cluster)
            .await?
            .into_iter()
            .find(|c| container_matches(c, service))
            .ok_or_else(|| BackendError::NotFound {
                operation,
                resource: format!("service {service} on cluster {cluster}"),
            })
    }

    async fn describe_one(
        &self,
        operation: &'static str,
        cluster: &str,
        service: &str,
    ) -> BackendResult<RawService> {
        let container = self.find_container(operation, cluster, service).await?;
        Ok(to_raw(cluster, &container))
    }
}

#[async_trait]
impl ClusterBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn register_task_definition(&self, spec: &TaskSpec) -> BackendResult<RawTaskDefinition> {
        Ok(self.task_definitions.lock().await.register(spec))
    }

    async fn describe_task_definition(
        &self,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        self.task_definitions
            .lock()
            .await
            .describe("describe_task_definition", reference)
    }

    async fn deregister_task_definition(
        &self,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        self.task_definitions
            .lock()
            .await
            .deregister("deregister_task_definition", reference)
    }

    async fn list_task_definitions(&self) -> BackendResult<Vec<String>> {
        Ok(self.task_definitions.lock().await.active_arns())
    }

    async fn list_task_definition_families(&self) -> BackendResult<Vec<String>> {
        Ok(self.task_definitions.lock().await.active_families())
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> BackendResult<RawService> {
        let spec = self
            .task_definitions
            .lock()
            .await
            .spec("create_service", &request.task_definition)?;

        // one container per service; the first container of the task runs it
        let container = spec
            .containers
            .first()
            .ok_or_else(|| BackendError::Rejected {
                operation: "create_service",
                message: format!(
                    "task definition {} has no containers",
                    request.task_definition
                ),
            })?;

        self.pull_image(&container.image).await?;

        let labels = HashMap::from([
            (LABEL_CLUSTER.to_string(), request.cluster.clone()),
            (LABEL_SERVICE.to_string(), request.service_name.clone()),
            (
                LABEL_TASK_DEFINITION.to_string(),
                request.task_definition.clone(),
            ),
        ]);

        let host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            memory: Some(i64::from(container.memory) * 1024 * 1024),
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(container.image.clone()),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: container_name(&request.cluster, &request.service_name),
            ..Default::default()
        });

        let created = self
            .client
            .create_container(options, container_config)
            .await
            .map_err(docker_error("create_service"))?;
        info!(container_id = %created.id, service = %request.service_name, "container created");

        if request.desired_count > 0 {
            self.client
                .start_container(&created.id, None::<StartContainerOptions<String>>)
                .await
                .map_err(docker_error("create_service"))?;
            info!(container_id = %created.id, "container started");
        }

        self.tombstones
            .lock()
            .await
            .remove(&(request.cluster.clone(), request.service_name.clone()));

        self.describe_one("create_service", &request.cluster, &request.service_name)
            .await
    }

    async fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> BackendResult<Vec<RawService>> {
        let containers = self.containers("describe_services", cluster).await?;
        let tombstones = self.tombstones.lock().await;

        let described = services
            .iter()
            .filter_map(|service| {
                containers
                    .iter()
                    .find(|c| container_matches(c, service))
                    .map(|c| to_raw(cluster, c))
                    .or_else(|| {
                        tombstones
                            .get(&(cluster.to_string(), service.clone()))
                            .cloned()
                    })
            })
            .collect();

        Ok(described)
    }

    async fn update_service(&self, request: &UpdateServiceRequest) -> BackendResult<RawService> {
        if request.patch.task_definition.is_some() {
            return Err(BackendError::Rejected {
                operation: "update_service",
                message: "containers cannot switch task definitions in place".to_string(),
            });
        }

        let container = self
            .find_container("update_service", &request.cluster, &request.service)
            .await?;
        let id = container.id.clone().unwrap_or_default();

        match request.patch.desired_count {
            Some(0) => {
                self.client
                    .stop_container(&id, None::<StopContainerOptions>)
                    .await
                    .map_err(docker_error("update_service"))?;
                info!(container_id = %id, "container stopped");
            }
            Some(_) if container.state.as_deref() != Some("running") => {
                self.client
                    .start_container(&id, None::<StartContainerOptions<String>>)
                    .await
                    .map_err(docker_error("update_service"))?;
                info!(container_id = %id, "container started");
            }
            _ => {}
        }

        self.describe_one("update_service", &request.cluster, &request.service)
            .await
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> BackendResult<RawService> {
        let container = self.find_container("delete_service", cluster, service).await?;
        let id = container.id.clone().unwrap_or_default();

        self.client
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(docker_error("delete_service"))?;
        info!(container_id = %id, service, "container removed");

        let mut tombstone = to_raw(cluster, &container);
        tombstone.status = Some(STATUS_INACTIVE.to_string());
        tombstone.desired_count = Some(0);
        tombstone.running_count = Some(0);

        let name = label(&container, LABEL_SERVICE).unwrap_or(service).to_string();
        self.tombstones
            .lock()
            .await
            .insert((cluster.to_string(), name), tombstone.clone());
        if let Some(arn) = tombstone.service_arn.clone() {
            self.tombstones
                .lock()
                .await
                .insert((cluster.to_string(), arn), tombstone.clone());
        }

        Ok(tombstone)
    }

    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>> {
        Ok(self
            .containers("list_services", cluster)
            .await?
            .iter()
            .filter_map(|c| c.id.clone())
            .collect())
    }
}

fn docker_error(operation: &'static str) -> impl Fn(bollard::errors::Error) -> BackendError {
    move |e| match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => BackendError::NotFound {
            operation,
            resource: message,
        },
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if status_code < 500 => BackendError::Rejected { operation, message },
        other => BackendError::Unavailable {
            operation,
            message: other.to_string(),
        },
    }
}

fn label<'a>(container: &'a ContainerSummary, key: &str) -> Option<&'a str> {
    container
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

fn container_matches(container: &ContainerSummary, service: &str) -> bool {
    container.id.as_deref() == Some(service) || label(container, LABEL_SERVICE) == Some(service)
}

/// Docker names allow `[a-zA-Z0-9][a-zA-Z0-9_.-]`; cluster refs may be ARNs.
fn container_name(cluster: &str, service: &str) -> String {
    format!("{cluster}--{service}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn to_raw(cluster: &str, container: &ContainerSummary) -> RawService {
    let name = label(container, LABEL_SERVICE).unwrap_or_default().to_string();
    let running = container.state.as_deref() == Some("running");
    let state = container.state.clone().unwrap_or_else(|| "unknown".to_string());

    let event = if running {
        format!("(service {name}) has reached a steady state.")
    } else {
        format!("(service {name}) container is {state}.")
    };

    RawService {
        service_arn: container.id.clone(),
        service_name: Some(name),
        cluster_arn: Some(cluster.to_string()),
        task_definition: label(container, LABEL_TASK_DEFINITION).map(str::to_string),
        desired_count: Some(i64::from(running)),
        pending_count: Some(0),
        running_count: Some(i64::from(running)),
        status: Some(STATUS_ACTIVE.to_string()),
        deployments: Vec::new(),
        events: vec![RawServiceEvent::new(event)],
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, service: &str, state: &str) -> ContainerSummary {
        ContainerSummary {
            id: Some(id.to_string()),
            labels: Some(HashMap::from([
                (LABEL_CLUSTER.to_string(), "c".to_string()),
                (LABEL_SERVICE.to_string(), service.to_string()),
                (LABEL_TASK_DEFINITION.to_string(), "web:1".to_string()),
            ])),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn container_names_are_sanitized() {
        assert_eq!(
            container_name("arn:aws:ecs:cluster/a", "svc 1"),
            "arn-aws-ecs-cluster-a--svc-1"
        );
    }

    #[test]
    fn running_container_reports_steady_state() {
        let raw = to_raw("c", &summary("abc", "svc", "running"));
        assert_eq!(raw.service_name.as_deref(), Some("svc"));
        assert_eq!(raw.task_definition.as_deref(), Some("web:1"));
        assert!(
            raw.events[0]
                .message
                .as_deref()
                .unwrap()
                .contains("steady state")
        );
    }

    #[test]
    fn stopped_container_is_not_steady() {
        let raw = to_raw("c", &summary("abc", "svc", "exited"));
        assert_eq!(raw.desired_count, Some(0));
        assert!(!raw.events[0].message.as_deref().unwrap().contains("steady state"));
    }

    #[test]
    fn matches_by_id_or_service_label() {
        let c = summary("abc", "svc", "running");
        assert!(container_matches(&c, "abc"));
        assert!(container_matches(&c, "svc"));
        assert!(!container_matches(&c, "other"));
    }
}
