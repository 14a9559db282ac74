//! Convergence classification over described services.

use super::types::{ServiceDescriptor, ServiceStatus};
use crate::error::{ReconcileError, Result};

pub const STEADY_STATE_MARKER: &str = "steady state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Nothing was described; waiting will not help.
    Missing,
    NotSteady,
    Ready,
}

/// Readiness of the first descriptor, judged by its event log.
pub fn readiness(descriptors: &[ServiceDescriptor]) -> Readiness {
    match descriptors.first() {
        None => Readiness::Missing,
        Some(service)
            if service
                .events
                .iter()
                .any(|message| message.contains(STEADY_STATE_MARKER)) =>
        {
            Readiness::Ready
        }
        Some(_) => Readiness::NotSteady,
    }
}

pub fn check_ready(descriptors: Vec<ServiceDescriptor>) -> Result<Vec<ServiceDescriptor>> {
    match readiness(&descriptors) {
        Readiness::Ready => Ok(descriptors),
        Readiness::NotSteady => Err(ReconcileError::NotConverged(format!(
            "service {} has not reached a steady state",
            descriptors[0].service_ref
        ))),
        Readiness::Missing => Err(ReconcileError::Polling(
            "no services described while waiting for readiness".into(),
        )),
    }
}

/// True when at least one service was described and all of them are inactive.
pub fn is_drained(descriptors: &[ServiceDescriptor]) -> bool {
    !descriptors.is_empty()
        && descriptors
            .iter()
            .all(|service| service.status == ServiceStatus::Inactive)
}

pub fn check_drained(descriptors: Vec<ServiceDescriptor>) -> Result<Vec<ServiceDescriptor>> {
    if is_drained(&descriptors) {
        return Ok(descriptors);
    }
    let pending: Vec<&str> = descriptors
        .iter()
        .filter(|service| service.status != ServiceStatus::Inactive)
        .map(|service| service.service_ref.as_str())
        .collect();
    Err(ReconcileError::NotConverged(if pending.is_empty() {
        "no services described yet".to_string()
    } else {
        format!("still draining: {}", pending.join(", "))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, status: ServiceStatus, events: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor {
            service_ref: format!("arn:svc/{name}"),
            service_name: name.to_string(),
            task_definition_ref: "web:1".into(),
            cluster_ref: "shop".into(),
            desired_count: 1,
            pending_count: 0,
            running_count: 1,
            status,
            deployments: Vec::new(),
            last_event_message: events.first().map(|e| e.to_string()),
            events: events.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn empty_list_is_fatal_for_readiness() {
        assert_eq!(readiness(&[]), Readiness::Missing);
        let err = check_ready(Vec::new()).unwrap_err();
        assert!(matches!(err, ReconcileError::Polling(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn steady_state_event_anywhere_in_the_log() {
        let ready = service(
            "web",
            ServiceStatus::Active,
            &["has started 1 tasks.", "(service web) has reached a steady state."],
        );
        assert_eq!(check_ready(vec![ready]).unwrap().len(), 1);
    }

    #[test]
    fn only_first_descriptor_is_consulted() {
        let waiting = service("web", ServiceStatus::Active, &["has started 1 tasks."]);
        let ready = service("api", ServiceStatus::Active, &["has reached a steady state."]);

        let err = check_ready(vec![waiting.clone(), ready.clone()]).unwrap_err();
        assert!(err.is_retryable());
        assert!(check_ready(vec![ready, waiting]).is_ok());
    }

    #[test]
    fn drained_needs_every_service_inactive() {
        let gone = service("web", ServiceStatus::Inactive, &[]);
        let draining = service("api", ServiceStatus::Draining, &[]);

        assert!(is_drained(&[gone.clone()]));
        assert!(!is_drained(&[gone.clone(), draining.clone()]));
        assert!(!is_drained(&[]));

        let err = check_drained(vec![gone, draining]).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("arn:svc/api"));
        assert!(check_drained(Vec::new()).unwrap_err().is_retryable());
    }

    #[test]
    fn active_service_is_still_draining() {
        let active = service("web", ServiceStatus::Active, &["has reached a steady state."]);
        assert!(!is_drained(&[active.clone()]));

        let err = check_drained(vec![active]).unwrap_err();
        assert!(matches!(err, ReconcileError::NotConverged(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("arn:svc/web"));
    }
}
