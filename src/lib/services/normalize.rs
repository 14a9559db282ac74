use tracing::debug;

use super::types::ServiceDescriptor;
use crate::backend::RawService;

/// Maps a raw description onto a [`ServiceDescriptor`].
///
/// Returns `None` when the description has no usable reference, task
/// definition or status. `cluster` fills in a missing cluster reference.
pub fn normalize_description(raw: RawService, cluster: &str) -> Option<ServiceDescriptor> {
    let service_ref = raw
        .service_arn
        .clone()
        .or_else(|| raw.service_name.clone())?;
    let service_name = raw
        .service_name
        .clone()
        .unwrap_or_else(|| short_name(&service_ref).to_string());
    let task_definition_ref = raw.task_definition?;
    let status = raw.status.as_deref()?.parse().ok()?;

    let events: Vec<String> = raw.events.into_iter().filter_map(|e| e.message).collect();

    Some(ServiceDescriptor {
        service_ref,
        service_name,
        task_definition_ref,
        cluster_ref: raw.cluster_arn.unwrap_or_else(|| cluster.to_string()),
        desired_count: count(raw.desired_count),
        pending_count: count(raw.pending_count),
        running_count: count(raw.running_count),
        status,
        deployments: raw.deployments,
        last_event_message: events.first().cloned(),
        events,
    })
}

/// Normalizes every description, skipping malformed ones.
pub fn normalize_descriptions(raws: Vec<RawService>, cluster: &str) -> Vec<ServiceDescriptor> {
    raws.into_iter()
        .filter_map(|raw| {
            let reference = raw.service_arn.clone();
            let normalized = normalize_description(raw, cluster);
            if normalized.is_none() {
                debug!(?reference, "skipping malformed service description");
            }
            normalized
        })
        .collect()
}

fn count(value: Option<i64>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

fn short_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawServiceEvent;
    use crate::services::ServiceStatus;

    fn raw() -> RawService {
        RawService {
            service_arn: Some("arn:svc/shop/web".into()),
            task_definition: Some("web:1".into()),
            desired_count: Some(1),
            pending_count: Some(-3),
            status: Some("ACTIVE".into()),
            events: vec![
                RawServiceEvent::new("has reached a steady state."),
                RawServiceEvent::new("has started 1 tasks."),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn fills_gaps_from_context() {
        let d = normalize_description(raw(), "shop").unwrap();
        assert_eq!(d.service_name, "web");
        assert_eq!(d.cluster_ref, "shop");
        assert_eq!(d.desired_count, 1);
        assert_eq!(d.pending_count, 0);
        assert_eq!(d.running_count, 0);
        assert_eq!(d.status, ServiceStatus::Active);
        assert_eq!(
            d.last_event_message.as_deref(),
            Some("has reached a steady state.")
        );
        assert_eq!(d.events.len(), 2);
    }

    #[test]
    fn malformed_descriptions_are_dropped() {
        let no_ref = RawService {
            service_arn: None,
            ..raw()
        };
        let no_task = RawService {
            task_definition: None,
            ..raw()
        };
        let odd_status = RawService {
            status: Some("EXPLODED".into()),
            ..raw()
        };
        assert!(normalize_description(no_ref.clone(), "shop").is_none());

        let kept = normalize_descriptions(vec![no_ref, raw(), no_task, odd_status], "shop");
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn service_name_alone_is_a_reference() {
        let by_name = RawService {
            service_arn: None,
            service_name: Some("web".into()),
            ..raw()
        };
        let d = normalize_description(by_name, "shop").unwrap();
        assert_eq!(d.service_ref, "web");
    }
}
