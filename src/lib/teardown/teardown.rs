use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::deferred::{Deferred, require};
use crate::error::Result;
use crate::services::ServiceManager;

/// What a teardown does when some services fail to stop or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Fail with the first error once every service has settled.
    FailFast,
    /// Report failures and still wait for the deleted services to drain.
    #[default]
    Collect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub service: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub cluster: String,
    /// Services that were deleted and have drained.
    pub destroyed: Vec<String>,
    pub failed: Vec<ServiceFailure>,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes every service on a cluster.
pub struct ClusterTeardown {
    services: Arc<ServiceManager>,
    policy: TeardownPolicy,
}

impl ClusterTeardown {
    pub fn new(services: Arc<ServiceManager>, policy: TeardownPolicy) -> Self {
        Self { services, policy }
    }

    /// Stops and deletes all services of `cluster` concurrently, then waits
    /// until the deleted ones report drained.
    pub fn stop_and_destroy_cluster(
        &self,
        cluster: &str,
    ) -> Result<Deferred<'_, TeardownReport>> {
        require(cluster, "stop_and_destroy_cluster requires a cluster")?;
        let cluster = cluster.to_string();

        Ok(Box::pin(async move {
            let services = self.services.list(&cluster)?.await?;
            info!(%cluster, services = services.len(), "tearing down cluster");

            let target = cluster.as_str();
            let outcomes = join_all(services.iter().map(|service| async move {
                let outcome = match self.services.stop_and_destroy(target, service) {
                    Ok(pending) => pending.await,
                    Err(err) => Err(err),
                };
                (service.clone(), outcome)
            }))
            .await;

            let mut report = TeardownReport {
                cluster: cluster.clone(),
                ..Default::default()
            };
            let mut first_error = None;
            for (service, outcome) in outcomes {
                match outcome {
                    Ok(_) => report.destroyed.push(service),
                    Err(err) => {
                        warn!(%cluster, %service, error = %err, "service teardown failed");
                        report.failed.push(ServiceFailure {
                            service,
                            error: err.to_string(),
                        });
                        first_error.get_or_insert(err);
                    }
                }
            }

            if let (TeardownPolicy::FailFast, Some(err)) = (self.policy, first_error) {
                return Err(err);
            }

            if !report.destroyed.is_empty() {
                self.services
                    .wait_for_drained(&cluster, &report.destroyed)?
                    .await?;
            }

            info!(
                %cluster,
                destroyed = report.destroyed.len(),
                failed = report.failed.len(),
                "cluster torn down"
            );
            Ok(report)
        }))
    }
}
