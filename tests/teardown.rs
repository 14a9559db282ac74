mod common;

use r_fleet::ReconcileError;
use r_fleet::backend::InMemoryBackend;
use r_fleet::teardown::{ClusterTeardown, TeardownPolicy};

use common::{Harness, harness};

async fn with_services(names: &[&str]) -> Harness {
    let h = harness(InMemoryBackend::new(1, 2));
    for name in names {
        h.services
            .create_task_and_service("cluster-a", name, "web")
            .unwrap()
            .await
            .unwrap();
    }
    h
}

#[tokio::test]
async fn empty_cluster_tears_down_cleanly() {
    let h = harness(InMemoryBackend::default());
    let teardown = ClusterTeardown::new(h.services.clone(), TeardownPolicy::Collect);

    let report = teardown
        .stop_and_destroy_cluster("cluster-a")
        .unwrap()
        .await
        .unwrap();

    assert!(report.destroyed.is_empty());
    assert!(report.is_complete());
    assert_eq!(h.backend.calls("describe_services").await, 0);
}

#[tokio::test]
async fn missing_cluster_is_a_precondition() {
    let h = harness(InMemoryBackend::default());
    let teardown = ClusterTeardown::new(h.services.clone(), TeardownPolicy::Collect);

    let err = teardown.stop_and_destroy_cluster("").err().unwrap();
    assert!(err.is_precondition());
    assert_eq!(h.backend.calls("list_services").await, 0);
}

#[tokio::test(start_paused = true)]
async fn every_service_is_stopped_deleted_and_drained() {
    let h = with_services(&["svc-1", "svc-2", "svc-3"]).await;
    let teardown = ClusterTeardown::new(h.services.clone(), TeardownPolicy::Collect);

    let report = teardown
        .stop_and_destroy_cluster("cluster-a")
        .unwrap()
        .await
        .unwrap();

    assert_eq!(report.destroyed.len(), 3);
    assert!(report.is_complete());
    assert_eq!(h.backend.calls("delete_service").await, 3);
    assert!(h.services.list("cluster-a").unwrap().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn collect_policy_reports_partial_failure() {
    let h = with_services(&["svc-1", "svc-2"]).await;
    let refs = h.services.list("cluster-a").unwrap().await.unwrap();
    h.backend.fail("delete_service", Some(refs[1].as_str())).await;
    let teardown = ClusterTeardown::new(h.services.clone(), TeardownPolicy::Collect);

    let report = teardown
        .stop_and_destroy_cluster("cluster-a")
        .unwrap()
        .await
        .unwrap();

    assert_eq!(report.destroyed, vec![refs[0].clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].service, refs[1]);
    assert!(!report.is_complete());
    // the failed service is scaled down but still listed
    assert_eq!(h.services.list("cluster-a").unwrap().await.unwrap(), vec![refs[1].clone()]);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_policy_propagates_first_error() {
    let h = with_services(&["svc-1", "svc-2"]).await;
    let refs = h.services.list("cluster-a").unwrap().await.unwrap();
    h.backend.fail("delete_service", Some(refs[0].as_str())).await;
    let teardown = ClusterTeardown::new(h.services.clone(), TeardownPolicy::FailFast);

    let err = teardown
        .stop_and_destroy_cluster("cluster-a")
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Backend { .. }));
    // the other service was still deleted
    assert_eq!(h.backend.calls("delete_service").await, 2);
}
