//! End-to-end replacement runs against the in-memory cluster
//!
//! Each test seeds an `InMemoryCluster`, drives a full `ReplacementOrchestrator`
//! run and checks the ordered event log the cluster recorded.

use std::collections::HashMap;
use std::sync::Arc;

use masterswap::cluster::{
    parse_simulation, ClusterEvent, InMemoryCluster, NodePool, Outcome, Phase, PoolRef,
    ReplaceError, ReplacementOrchestrator,
};
use masterswap::config::{ConfigInputs, CycleBudget, ReplaceConfig, Settings};

const NS: &str = "openshift-machine-api";
const TARGET: &str = "perf-master-new";

fn pool(name: &str, replicas: u32) -> NodePool {
    NodePool::new(PoolRef::new(NS, name), replicas)
}

fn config(requested: u32, budget: CycleBudget) -> ReplaceConfig {
    ReplaceConfig::from_parts(
        ConfigInputs {
            cluster_name: Some("perf".to_string()),
            cloud_type: "aws".to_string(),
            requested_replicas: requested,
            instance_type: "m6i.2xlarge".to_string(),
            cycle_budget: budget,
            ..Default::default()
        },
        Settings::default(),
    )
    .unwrap()
}

/// Cluster with three old master pools holding 2, 1 and 2 replicas
fn five_masters() -> InMemoryCluster {
    InMemoryCluster::new()
        .with_pool(pool("perf-master-a", 2))
        .with_pool(pool("perf-infra-a", 3))
        .with_pool(pool("perf-master-b", 1))
        .with_pool(pool("perf-master-c", 2))
        .with_manifest(pool(TARGET, 0))
}

fn scaled(events: &[ClusterEvent]) -> Vec<(String, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            ClusterEvent::Scaled { pool, replicas } => Some((pool.name.clone(), *replicas)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_five_masters_replaced_in_roster_order() {
    let cluster = Arc::new(five_masters());
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.cycles_planned, 5);
    assert_eq!(summary.cycles_completed(), 5);
    assert_eq!(summary.target_replicas, 5);
    assert_eq!(orchestrator.phase(), Phase::Done);

    let events = cluster.events().await;
    let scale_downs: Vec<String> = scaled(&events)
        .into_iter()
        .filter(|(name, _)| name != TARGET)
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        scale_downs,
        vec![
            "perf-master-a",
            "perf-master-a",
            "perf-master-b",
            "perf-master-c",
            "perf-master-c"
        ]
    );

    assert_eq!(cluster.replicas_of(TARGET).await, Some(5));
    assert_eq!(cluster.replicas_of("perf-master-a").await, Some(0));
    assert_eq!(cluster.replicas_of("perf-master-b").await, Some(0));
    assert_eq!(cluster.replicas_of("perf-master-c").await, Some(0));
    assert!(cluster.scale_history("perf-infra-a").await.is_empty());
    assert_eq!(cluster.replicas_of("perf-infra-a").await, Some(3));
}

#[tokio::test]
async fn test_every_scale_is_followed_by_wait_then_health_check() {
    let cluster = Arc::new(five_masters());
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();
    orchestrator.run().await.unwrap();

    let events = cluster.events().await;
    for (i, event) in events.iter().enumerate() {
        if let ClusterEvent::Scaled { pool, replicas } = event {
            match &events[i + 1] {
                ClusterEvent::WaitedReady { pool: p, count } if pool.name == TARGET => {
                    assert_eq!((p, count), (pool, replicas));
                }
                ClusterEvent::WaitedDrain { pool: p, count } => {
                    assert_eq!((p, count), (pool, replicas));
                }
                other => panic!("scale of {} followed by {:?}", pool, other),
            }
            assert_eq!(events[i + 2], ClusterEvent::HealthChecked { healthy: true });
        }
    }
    assert_eq!(
        events.last(),
        Some(&ClusterEvent::HealthChecked { healthy: true })
    );
}

#[tokio::test]
async fn test_target_only_grows_and_replicas_are_conserved() {
    let cluster = Arc::new(five_masters());
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();
    orchestrator.run().await.unwrap();

    let history = cluster.scale_history(TARGET).await;
    assert_eq!(history, vec![1, 2, 3, 4, 5]);

    let mut replicas: HashMap<String, u32> = [
        ("perf-master-a", 2),
        ("perf-master-b", 1),
        ("perf-master-c", 2),
        (TARGET, 0),
    ]
    .into_iter()
    .map(|(n, r)| (n.to_string(), r))
    .collect();

    for (name, count) in scaled(&cluster.events().await) {
        let is_source = name != TARGET;
        replicas.insert(name, count);
        if is_source {
            assert_eq!(replicas.values().sum::<u32>(), 5);
        }
    }
}

#[tokio::test]
async fn test_existing_target_reset_to_zero_first() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 1))
            .with_pool(pool(TARGET, 2))
            .with_manifest(pool(TARGET, 0)),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(1, CycleBudget::Discovered)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    let events = cluster.events().await;
    let scales = scaled(&events);
    assert_eq!(scales[0], (TARGET.to_string(), 0));
    assert_eq!(scales[1], (TARGET.to_string(), 1));
    assert!(events.contains(&ClusterEvent::WaitedDrain {
        pool: PoolRef::new(NS, TARGET),
        count: 0
    }));
    assert_eq!(summary.target_replicas, 1);
    assert_eq!(summary.pools.len(), 1);
}

#[tokio::test]
async fn test_health_failure_aborts_without_rollback() {
    let cluster = Arc::new(five_masters().with_health_failure_after_scale(TARGET, 3));
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    match &err {
        ReplaceError::HealthCheckFailed { stage, .. } => {
            assert_eq!(stage, "after scale-up of cycle 3");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert_eq!(orchestrator.cycles().len(), 2);

    let plan = orchestrator.plan().unwrap();
    assert_eq!(plan.target_replicas(), 3);
    assert_eq!(plan.remaining_total(), 3);

    assert_eq!(cluster.replicas_of(TARGET).await, Some(3));
    assert_eq!(cluster.replicas_of("perf-master-a").await, Some(0));
    assert_eq!(cluster.replicas_of("perf-master-b").await, Some(1));
    assert!(cluster.scale_history("perf-master-b").await.is_empty());
    assert_eq!(
        cluster.events().await.last(),
        Some(&ClusterEvent::HealthChecked { healthy: false })
    );
}

#[tokio::test]
async fn test_no_source_pools_is_nothing_to_do() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-infra-a", 3))
            .with_pool(pool("perf-master-old", 0))
            .with_manifest(pool(TARGET, 0)),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(3, CycleBudget::Discovered)).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.outcome, Outcome::NothingToDo);
    assert!(summary.cycles.is_empty());
    assert_eq!(summary.target_replicas, 0);
    assert_eq!(orchestrator.phase(), Phase::Done);
    assert!(scaled(&cluster.events().await).is_empty());
}

#[tokio::test]
async fn test_requested_budget_stops_when_roster_exhausted() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 2))
            .with_manifest(pool(TARGET, 0)),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(3, CycleBudget::Requested)).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.outcome, Outcome::CompletedEarly);
    assert_eq!(summary.cycles_planned, 3);
    assert_eq!(summary.cycles.len(), 3);
    assert_eq!(summary.cycles_completed(), 2);
    assert!(summary.cycles[2].scale_down.is_none());
    assert_eq!(summary.target_replicas, 3);
    assert_eq!(cluster.replicas_of(TARGET).await, Some(3));
    assert_eq!(cluster.scale_history("perf-master-a").await, vec![1, 0]);
    assert_eq!(orchestrator.phase(), Phase::Done);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["outcome"], "completed-early");
}

#[tokio::test]
async fn test_discovered_budget_ignores_requested_count() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 2))
            .with_manifest(pool(TARGET, 0)),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(3, CycleBudget::Discovered)).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.target_replicas, 2);
    assert_eq!(summary.requested_replicas, 3);
}

#[tokio::test]
async fn test_unreadable_pool_is_skipped() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 1))
            .with_pool(pool("perf-master-b", 2))
            .with_manifest(pool(TARGET, 0))
            .with_read_failure("perf-master-a"),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(3, CycleBudget::Discovered)).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.target_replicas, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].pool.name, "perf-master-a");
    assert!(cluster.scale_history("perf-master-a").await.is_empty());
    assert_eq!(cluster.replicas_of("perf-master-b").await, Some(0));
}

#[tokio::test]
async fn test_ready_wait_timeout_is_fatal() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 3))
            .with_manifest(pool(TARGET, 0))
            .with_ready_timeout_at(2),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(3, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, ReplaceError::ReadinessWaitTimeout { .. }));
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert_eq!(cluster.replicas_of(TARGET).await, Some(2));
    assert_eq!(cluster.replicas_of("perf-master-a").await, Some(2));
}

#[tokio::test]
async fn test_simulation_file_drives_a_run() {
    let spec = parse_simulation(
        r#"
pools:
  - name: perf-master-us-east-1a
    replicas: 1
  - name: perf-master-us-east-1b
    replicas: 1
  - name: perf-workers
    replicas: 4
    labels:
      machine.openshift.io/cluster-api-machine-role: infra
"#,
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.infra.labels = masterswap::cluster::LabelSelector::matching(
        "machine.openshift.io/cluster-api-machine-role",
        "infra",
    );
    let config = ReplaceConfig::from_parts(
        ConfigInputs {
            cluster_name: Some("perf".to_string()),
            cloud_type: "aws".to_string(),
            requested_replicas: 2,
            instance_type: "m6i.2xlarge".to_string(),
            ..Default::default()
        },
        settings,
    )
    .unwrap();

    let cluster = Arc::new(InMemoryCluster::from_simulation(&spec, &config.target));
    let mut orchestrator = ReplacementOrchestrator::new(cluster.clone(), config).unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.target_replicas, 2);
    assert_eq!(cluster.replicas_of("perf-workers").await, Some(4));
}

#[tokio::test]
async fn test_dry_run_preview_matches_run() {
    let cluster = Arc::new(five_masters());
    let orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let preview = orchestrator.preview().await.unwrap();
    let schedule = preview.plan.schedule();

    assert_eq!(schedule.len(), 5);
    assert_eq!(schedule[2].source.as_ref().unwrap().name, "perf-master-b");
    assert!(scaled(&cluster.events().await).is_empty());
}

#[tokio::test]
async fn test_rejected_scale_down_keeps_plan_at_last_applied_state() {
    let cluster = Arc::new(five_masters().with_scale_failure("perf-master-a", 1));
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    match &err {
        ReplaceError::ScaleCommandFailed { pool, replicas, .. } => {
            assert_eq!(pool.name, "perf-master-a");
            assert_eq!(*replicas, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert!(orchestrator.cycles().is_empty());

    let plan = orchestrator.plan().unwrap();
    assert_eq!(plan.target_replicas(), 1);
    assert_eq!(plan.remaining_total(), 5);
    assert_eq!(plan.entries()[0].remaining, 2);
    assert_eq!(cluster.replicas_of("perf-master-a").await, Some(2));
    assert_eq!(cluster.replicas_of(TARGET).await, Some(1));
}

#[tokio::test]
async fn test_rejected_scale_up_keeps_target_count() {
    let cluster = Arc::new(five_masters().with_scale_failure(TARGET, 2));
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, ReplaceError::ScaleCommandFailed { replicas: 2, .. }));
    assert_eq!(orchestrator.cycles().len(), 1);

    let plan = orchestrator.plan().unwrap();
    assert_eq!(plan.target_replicas(), 1);
    assert_eq!(plan.remaining_total(), 4);
    assert!(plan.is_balanced());
    assert_eq!(cluster.replicas_of(TARGET).await, Some(1));
}

#[tokio::test]
async fn test_drain_timeout_is_fatal() {
    let cluster = Arc::new(five_masters().with_drain_timeout_at("perf-master-b", 0));
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, ReplaceError::ReadinessWaitTimeout { .. }));
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert_eq!(orchestrator.cycles().len(), 2);

    // the scale command itself went through, so the plan records it
    let plan = orchestrator.plan().unwrap();
    assert_eq!(plan.target_replicas(), 3);
    assert_eq!(plan.remaining_total(), 2);

    let events = cluster.events().await;
    assert_eq!(
        events.last(),
        Some(&ClusterEvent::WaitedDrain {
            pool: PoolRef::new(NS, "perf-master-b"),
            count: 0
        })
    );
    assert!(cluster.scale_history("perf-master-c").await.is_empty());
}

#[tokio::test]
async fn test_health_failure_after_scale_down_aborts() {
    let cluster = Arc::new(five_masters().with_health_failure_after_scale("perf-master-b", 0));
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(5, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    match &err {
        ReplaceError::HealthCheckFailed { stage, .. } => {
            assert_eq!(stage, "after scale-down of cycle 3");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(orchestrator.cycles().len(), 3);
    assert_eq!(cluster.replicas_of(TARGET).await, Some(3));
    assert_eq!(cluster.replicas_of("perf-master-b").await, Some(0));
    assert_eq!(cluster.scale_history(TARGET).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_all_pools_unreadable_aborts_instead_of_nothing_to_do() {
    let cluster = Arc::new(
        InMemoryCluster::new()
            .with_pool(pool("perf-master-a", 2))
            .with_pool(pool("perf-infra-a", 3))
            .with_manifest(pool(TARGET, 0))
            .with_read_failure("perf-master-a"),
    );
    let mut orchestrator =
        ReplacementOrchestrator::new(cluster.clone(), config(2, CycleBudget::Discovered)).unwrap();

    let err = orchestrator.run().await.unwrap_err();

    match &err {
        ReplaceError::NoSourcePoolsFound { skipped, .. } => {
            assert_eq!(skipped.len(), 1);
            assert_eq!(skipped[0].pool.name, "perf-master-a");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert!(scaled(&cluster.events().await).is_empty());
}
