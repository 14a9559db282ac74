use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::registry::DeletionOutcome;
use crate::services::{AppDefinition, ServiceManager};
use crate::teardown::ClusterTeardown;

/// Shared by every request handler.
pub struct AppState {
    pub services: Arc<ServiceManager>,
    pub teardown: Arc<ClusterTeardown>,
}

pub struct FleetServer {
    pub state: Arc<AppState>,
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub service_name: String,
    #[serde(flatten)]
    pub app: AppDefinition,
}

/// `?wait=true` keeps the request open until the operation converged.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub cluster: Option<String>,
    pub request: Option<String>,
    pub deployment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeBody {
    pub result: DeletionOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBody {
    pub cluster: String,
    pub operation: &'static str,
}

#[derive(Debug)]
pub struct ApiError(pub ReconcileError);

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ReconcileError::InvalidSpec(_) | ReconcileError::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            ReconcileError::Backend { .. } => StatusCode::BAD_GATEWAY,
            ReconcileError::NotConverged(_) => StatusCode::CONFLICT,
            ReconcileError::PollingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ReconcileError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            ReconcileError::Polling(_) | ReconcileError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
