//! A simulated cluster kept in process memory.
//!
//! Services walk through the same observable states a real cluster reports:
//! after `steady_after` describes an active service logs a steady-state event,
//! and after `drain_after` describes a deleted one turns `INACTIVE`. Every
//! call is counted and any operation can be made to fail, which is what the
//! reconciliation tests rely on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{BackendError, BackendResult, ClusterBackend};
use super::table::TaskDefinitionTable;
use super::types::{
    CreateServiceRequest, RawService, RawServiceEvent, RawTaskDefinition, STATUS_ACTIVE,
    STATUS_DRAINING, STATUS_INACTIVE, UpdateServiceRequest,
};
use crate::config::BackendConfig;
use crate::tasks::TaskSpec;

const ARN_PREFIX: &str = "arn:fleet:local";

#[derive(Debug, Clone)]
struct ServiceRecord {
    arn: String,
    name: String,
    cluster: String,
    task_definition: String,
    desired: u32,
    running: u32,
    status: &'static str,
    steady: bool,
    observations: u32,
    events: Vec<RawServiceEvent>,
}

impl ServiceRecord {
    fn matches(&self, reference: &str) -> bool {
        self.arn == reference || self.name == reference
    }

    fn log(&mut self, message: String) {
        self.events.insert(0, RawServiceEvent::new(message));
    }

    /// Advances the simulation by one observation.
    fn observe(&mut self, steady_after: u32, drain_after: u32) {
        self.observations += 1;
        match self.status {
            STATUS_ACTIVE if !self.steady && self.observations >= steady_after => {
                self.running = self.desired;
                self.steady = true;
                self.log(format!("(service {}) has reached a steady state.", self.name));
            }
            STATUS_DRAINING if self.observations >= drain_after => {
                self.running = 0;
                self.status = STATUS_INACTIVE;
            }
            _ => {}
        }
    }

    fn to_raw(&self) -> RawService {
        RawService {
            service_arn: Some(self.arn.clone()),
            service_name: Some(self.name.clone()),
            cluster_arn: Some(self.cluster.clone()),
            task_definition: Some(self.task_definition.clone()),
            desired_count: Some(self.desired.into()),
            pending_count: Some(self.desired.saturating_sub(self.running).into()),
            running_count: Some(self.running.into()),
            status: Some(self.status.to_string()),
            deployments: vec![serde_json::json!({
                "status": "PRIMARY",
                "taskDefinition": self.task_definition,
                "desiredCount": self.desired,
                "runningCount": self.running,
            })],
            events: self.events.clone(),
            extra: Default::default(),
        }
    }
}

#[derive(Debug)]
struct State {
    task_definitions: TaskDefinitionTable,
    clusters: HashMap<String, BTreeMap<String, ServiceRecord>>,
    calls: HashMap<&'static str, usize>,
    failures: HashSet<(&'static str, Option<String>)>,
}

pub struct InMemoryBackend {
    state: Mutex<State>,
    steady_after: u32,
    drain_after: u32,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    pub fn new(steady_after: u32, drain_after: u32) -> Self {
        Self {
            state: Mutex::new(State {
                task_definitions: TaskDefinitionTable::new(ARN_PREFIX),
                clusters: HashMap::new(),
                calls: HashMap::new(),
                failures: HashSet::new(),
            }),
            steady_after,
            drain_after,
            latency: None,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.steady_after, config.drain_after)
    }

    /// Sleeps this long inside every call, so concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of times `operation` was invoked.
    pub async fn calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Makes `operation` fail, for every resource or only for `resource`.
    pub async fn fail(&self, operation: &'static str, resource: Option<&str>) {
        self.state
            .lock()
            .await
            .failures
            .insert((operation, resource.map(str::to_string)));
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    async fn enter(&self, operation: &'static str, resource: &str) -> BackendResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().await;
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.failures.contains(&(operation, None))
            || state
                .failures
                .contains(&(operation, Some(resource.to_string())))
        {
            return Err(BackendError::Unavailable {
                operation,
                message: format!("injected failure for {resource}"),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::from_config(&BackendConfig::default())
    }
}

fn find_service<'a>(
    state: &'a mut State,
    operation: &'static str,
    cluster: &str,
    reference: &str,
) -> BackendResult<&'a mut ServiceRecord> {
    state
        .clusters
        .get_mut(cluster)
        .and_then(|services| {
            services
                .values_mut()
                .find(|s| s.matches(reference) && s.status != STATUS_INACTIVE)
        })
        .ok_or_else(|| BackendError::NotFound {
            operation,
            resource: format!("service {reference} on cluster {cluster}"),
        })
}

#[async_trait]
impl ClusterBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn register_task_definition(&self, spec: &TaskSpec) -> BackendResult<RawTaskDefinition> {
        self.enter("register_task_definition", &spec.family).await?;
        Ok(self.state.lock().await.task_definitions.register(spec))
    }

    async fn describe_task_definition(
        &self,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        self.enter("describe_task_definition", reference).await?;
        self.state
            .lock()
            .await
            .task_definitions
            .describe("describe_task_definition", reference)
    }

    async fn deregister_task_definition(
        &self,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        self.enter("deregister_task_definition", reference).await?;
        self.state
            .lock()
            .await
            .task_definitions
            .deregister("deregister_task_definition", reference)
    }

    async fn list_task_definitions(&self) -> BackendResult<Vec<String>> {
        self.enter("list_task_definitions", "").await?;
        Ok(self.state.lock().await.task_definitions.active_arns())
    }

    async fn list_task_definition_families(&self) -> BackendResult<Vec<String>> {
        self.enter("list_task_definition_families", "").await?;
        Ok(self.state.lock().await.task_definitions.active_families())
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> BackendResult<RawService> {
        self.enter("create_service", &request.service_name).await?;
        let mut state = self.state.lock().await;

        // a service can only be bound to a registered definition
        state
            .task_definitions
            .spec("create_service", &request.task_definition)?;

        let live = state
            .clusters
            .get(&request.cluster)
            .and_then(|services| services.get(&request.service_name))
            .is_some_and(|existing| existing.status != STATUS_INACTIVE);
        if live {
            return Err(BackendError::Rejected {
                operation: "create_service",
                message: format!(
                    "service {} already exists on {}",
                    request.service_name, request.cluster
                ),
            });
        }

        let mut record = ServiceRecord {
            arn: format!(
                "{ARN_PREFIX}:service/{}/{}",
                request.cluster, request.service_name
            ),
            name: request.service_name.clone(),
            cluster: request.cluster.clone(),
            task_definition: request.task_definition.clone(),
            desired: request.desired_count,
            running: 0,
            status: STATUS_ACTIVE,
            steady: false,
            observations: 0,
            events: Vec::new(),
        };
        record.log(format!(
            "(service {}) has started {} tasks.",
            record.name, record.desired
        ));
        let raw = record.to_raw();

        state
            .clusters
            .entry(request.cluster.clone())
            .or_default()
            .insert(request.service_name.clone(), record);
        Ok(raw)
    }

    async fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> BackendResult<Vec<RawService>> {
        self.enter("describe_services", cluster).await?;
        let mut state = self.state.lock().await;
        let Some(records) = state.clusters.get_mut(cluster) else {
            return Ok(Vec::new());
        };

        let mut described = Vec::new();
        for reference in services {
            if let Some(record) = records.values_mut().find(|s| s.matches(reference)) {
                record.observe(self.steady_after, self.drain_after);
                described.push(record.to_raw());
            }
        }
        Ok(described)
    }

    async fn update_service(&self, request: &UpdateServiceRequest) -> BackendResult<RawService> {
        self.enter("update_service", &request.service).await?;
        let mut state = self.state.lock().await;

        if let Some(reference) = &request.patch.task_definition {
            state.task_definitions.spec("update_service", reference)?;
        }

        let record = find_service(
            &mut state,
            "update_service",
            &request.cluster,
            &request.service,
        )?;

        if let Some(desired) = request.patch.desired_count {
            if desired != record.desired {
                record.desired = desired;
                record.steady = false;
                record.observations = 0;
                if desired == 0 {
                    record.running = 0;
                    record.log(format!("(service {}) has stopped all tasks.", record.name));
                }
            }
        }
        if let Some(reference) = &request.patch.task_definition {
            record.task_definition = reference.clone();
            record.steady = false;
            record.observations = 0;
        }
        Ok(record.to_raw())
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> BackendResult<RawService> {
        self.enter("delete_service", service).await?;
        let mut state = self.state.lock().await;
        let record = find_service(&mut state, "delete_service", cluster, service)?;

        if record.desired > 0 {
            return Err(BackendError::Rejected {
                operation: "delete_service",
                message: format!(
                    "service {} must be scaled to 0 before deletion",
                    record.name
                ),
            });
        }

        record.status = STATUS_DRAINING;
        record.observations = 0;
        Ok(record.to_raw())
    }

    async fn list_services(&self, cluster: &str) -> BackendResult<Vec<String>> {
        self.enter("list_services", cluster).await?;
        let state = self.state.lock().await;
        Ok(state
            .clusters
            .get(cluster)
            .map(|services| {
                services
                    .values()
                    .filter(|s| s.status != STATUS_INACTIVE)
                    .map(|s| s.arn.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
