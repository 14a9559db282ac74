use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::types::{
    AcceptedBody, ApiError, AppState, DeployRequest, FleetServer, ListQuery, OutcomeBody,
    WaitQuery,
};
use crate::backend::ServicePatch;
use crate::error::{ReconcileError, Result};
use crate::services::ServiceDescriptor;
use crate::tasks::{TaskDefinitionHandle, TaskInput};

type ApiResult<T> = std::result::Result<T, ApiError>;

impl FleetServer {
    pub fn new(state: Arc<AppState>, listen_addr: SocketAddr) -> Self {
        Self { state, listen_addr }
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/task-definitions", get(FleetServer::list_task_definitions))
            .route("/task-definitions", post(FleetServer::register_task_definition))
            .route(
                "/task-definitions/{reference}",
                delete(FleetServer::deregister_task_definition),
            )
            .route("/clusters/{cluster}", delete(FleetServer::teardown_cluster))
            .route("/clusters/{cluster}/services", get(FleetServer::describe_services))
            .route("/clusters/{cluster}/services", post(FleetServer::deploy))
            .route(
                "/clusters/{cluster}/services/{service}",
                patch(FleetServer::update_service),
            )
            .route(
                "/clusters/{cluster}/services/{service}",
                delete(FleetServer::destroy_service),
            )
            .with_state(state)
    }

    async fn register_task_definition(
        AxumState(state): AxumState<Arc<AppState>>,
        Json(task): Json<TaskInput>,
    ) -> ApiResult<(StatusCode, Json<TaskDefinitionHandle>)> {
        let handle = state.services.registry().register(task)?.await?;
        Ok((StatusCode::CREATED, Json(handle)))
    }

    async fn list_task_definitions(
        AxumState(state): AxumState<Arc<AppState>>,
        Query(query): Query<ListQuery>,
    ) -> ApiResult<Json<Vec<String>>> {
        let registry = state.services.registry();
        let pending = match (&query.cluster, &query.request, &query.deployment) {
            (None, None, None) => registry.list(),
            (_, Some(_), Some(_)) => {
                return Err(ReconcileError::InvalidArgument(
                    "filter by request or by deployment, not both".into(),
                )
                .into());
            }
            (Some(cluster), Some(request), None) => registry.list_for_request(cluster, request)?,
            (Some(cluster), None, Some(deployment)) => {
                registry.list_for_deployment(cluster, deployment)?
            }
            (Some(cluster), None, None) => registry.list_for_cluster(cluster)?,
            (None, _, _) => {
                return Err(ReconcileError::InvalidArgument(
                    "filtering by request or deployment requires a cluster".into(),
                )
                .into());
            }
        };
        Ok(Json(pending.await?))
    }

    async fn deregister_task_definition(
        AxumState(state): AxumState<Arc<AppState>>,
        Path(reference): Path<String>,
    ) -> ApiResult<Json<OutcomeBody>> {
        let result = state
            .services
            .registry()
            .find_and_deregister(&reference)?
            .await?;
        Ok(Json(OutcomeBody { result }))
    }

    async fn describe_services(
        AxumState(state): AxumState<Arc<AppState>>,
        Path(cluster): Path<String>,
    ) -> ApiResult<Json<Vec<ServiceDescriptor>>> {
        Ok(Json(state.services.describe_all(&cluster)?.await?))
    }

    async fn deploy(
        AxumState(state): AxumState<Arc<AppState>>,
        Path(cluster): Path<String>,
        Query(query): Query<WaitQuery>,
        Json(request): Json<DeployRequest>,
    ) -> ApiResult<Response> {
        let pending =
            state
                .services
                .create_all_for_cluster(&cluster, &request.service_name, &request.app)?;

        if query.wait {
            let services = pending.await?;
            return Ok((StatusCode::CREATED, Json(services)).into_response());
        }
        drop(pending);

        let background = state.clone();
        let target = cluster.clone();
        tokio::spawn(async move {
            let result = match background.services.create_all_for_cluster(
                &target,
                &request.service_name,
                &request.app,
            ) {
                Ok(pending) => pending.await,
                Err(err) => Err(err),
            };
            match result {
                Ok(services) => {
                    info!(cluster = %target, services = services.len(), "app deployed")
                }
                Err(err) => error!(cluster = %target, error = %err, "app deployment failed"),
            }
        });

        info!(%cluster, "deployment accepted");
        let body = AcceptedBody {
            cluster,
            operation: "deploy",
        };
        Ok((StatusCode::ACCEPTED, Json(body)).into_response())
    }

    async fn update_service(
        AxumState(state): AxumState<Arc<AppState>>,
        Path((cluster, service)): Path<(String, String)>,
        Json(patch): Json<ServicePatch>,
    ) -> ApiResult<Json<ServiceDescriptor>> {
        Ok(Json(state.services.update(&cluster, &service, patch)?.await?))
    }

    async fn destroy_service(
        AxumState(state): AxumState<Arc<AppState>>,
        Path((cluster, service)): Path<(String, String)>,
    ) -> ApiResult<Json<OutcomeBody>> {
        let result = state.services.find_and_destroy(&cluster, &service)?.await?;
        Ok(Json(OutcomeBody { result }))
    }

    async fn teardown_cluster(
        AxumState(state): AxumState<Arc<AppState>>,
        Path(cluster): Path<String>,
        Query(query): Query<WaitQuery>,
    ) -> ApiResult<Response> {
        let pending = state.teardown.stop_and_destroy_cluster(&cluster)?;

        if query.wait {
            let report = pending.await?;
            return Ok(Json(report).into_response());
        }
        drop(pending);

        let background = state.clone();
        let target = cluster.clone();
        tokio::spawn(async move {
            let result = match background.teardown.stop_and_destroy_cluster(&target) {
                Ok(pending) => pending.await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(cluster = %target, error = %err, "cluster teardown failed");
            }
        });

        info!(%cluster, "teardown accepted");
        let body = AcceptedBody {
            cluster,
            operation: "teardown",
        };
        Ok((StatusCode::ACCEPTED, Json(body)).into_response())
    }

    pub async fn start_server(self) -> Result<()> {
        let app = FleetServer::router(self.state);

        let listener = TcpListener::bind(self.listen_addr).await.map_err(|err| {
            ReconcileError::Config(format!("cannot listen on {}: {err}", self.listen_addr))
        })?;
        info!(addr = %self.listen_addr, "listening");

        axum::serve(listener, app)
            .await
            .map_err(|err| ReconcileError::Config(format!("server stopped: {err}")))
    }
}
