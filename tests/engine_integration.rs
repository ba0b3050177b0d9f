//! End-to-end tests for the table engine against the in-process log:
//! the full write/validate/commit/replay/read cycle, readiness gating,
//! and transaction-level atomicity of validation.

use std::sync::Arc;
use std::time::Duration;

use logtable::{
    Cluster, ClusterConfig, EntityEntry, EntityType, InMemoryLogBroker, PropertyDef,
    PropertyValue, RecordLog, TableError, TableKey, ValueKind, ViewStrategy,
};

fn order_entity() -> Arc<EntityType> {
    Arc::new(
        EntityType::new(
            "Order",
            vec![
                PropertyDef::new("Id", ValueKind::Int).required().auto_increment(),
                PropertyDef::new("Total", ValueKind::Float).concurrency_token(),
                PropertyDef::new("Status", ValueKind::Text).required(),
            ],
            &["Id"],
        )
        .unwrap(),
    )
}

fn customer_entity() -> Arc<EntityType> {
    Arc::new(
        EntityType::new(
            "Customer",
            vec![
                PropertyDef::new("Id", ValueKind::Int).required(),
                PropertyDef::new("Name", ValueKind::Text).required(),
            ],
            &["Id"],
        )
        .unwrap(),
    )
}

fn cluster_with(broker: Arc<InMemoryLogBroker>, strategy: ViewStrategy) -> Cluster {
    let config = ClusterConfig {
        database_name: "shop".into(),
        view_strategy: strategy,
        min_quiet_time: Duration::from_millis(20),
        sensitive_data_logging: true,
        ..Default::default()
    };
    Cluster::new(config, broker)
}

fn key(id: i64) -> TableKey {
    TableKey::Scalar(PropertyValue::Int(id))
}

// ============================================================================
// The Order scenario
// ============================================================================

#[tokio::test]
async fn test_create_then_read_round_trips() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    let rows = cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![7.into(), 42.5.into(), "open".into()],
        )])
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let table = cluster.ensure_table(&orders).await.unwrap();
    let row = table.try_get(&key(7)).await.unwrap().expect("row visible");
    assert_eq!(row.get(0), Some(&PropertyValue::Int(7)));
    assert_eq!(row.get(1), Some(&42.5.into()));
    assert_eq!(row.get(2), Some(&PropertyValue::Text("open".into())));
}

#[tokio::test]
async fn test_create_with_null_status_fails_before_any_commit() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker.clone(), ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    let err = cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![PropertyValue::Null, 10.0.into(), PropertyValue::Null],
        )])
        .await
        .unwrap_err();
    assert!(err.is_nullability_violation());
    assert!(err.to_string().contains("Status"));

    // Validation failed before the commit phase: nothing was appended.
    assert_eq!(broker.append_count(), 0);
}

#[tokio::test]
async fn test_update_with_stale_concurrency_token_conflicts() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![1.into(), 10.0.into(), "open".into()],
        )])
        .await
        .unwrap();

    // Someone else bumped Total to 15.0 underneath this caller.
    cluster
        .execute_transaction(vec![{
            EntityEntry::modified(
                orders.clone(),
                vec![1.into(), 15.0.into(), "open".into()],
                vec![1.into(), 10.0.into(), "open".into()],
            )
            .set_modified("Total")
            .unwrap()
        }])
        .await
        .unwrap();

    // This caller still believes Total=10.0 and only changes Status.
    let err = cluster
        .execute_transaction(vec![{
            EntityEntry::modified(
                orders.clone(),
                vec![1.into(), 10.0.into(), "paid".into()],
                vec![1.into(), 10.0.into(), "open".into()],
            )
            .set_modified("Status")
            .unwrap()
        }])
        .await
        .unwrap_err();

    match err {
        TableError::ConcurrencyConflict { conflicts, message, .. } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].property, "Total");
            assert!(message.contains("Total"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_of_never_created_key_conflicts() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker.clone(), ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    let err = cluster
        .execute_transaction(vec![EntityEntry::deleted(
            orders.clone(),
            vec![42.into(), 1.0.into(), "open".into()],
        )])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());
    assert_eq!(broker.append_count(), 0);
}

#[tokio::test]
async fn test_mixed_transaction_fails_whole_before_commit_dispatch() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker.clone(), ViewStrategy::ReplicatedMap);
    let orders = order_entity();
    let customers = customer_entity();

    // A valid create for one entity type plus an invalid update (missing
    // key) for another: validation happens fully before any commit, so
    // neither reaches the log.
    let valid = EntityEntry::added(orders.clone(), vec![1.into(), 10.0.into(), "open".into()]);
    let invalid = EntityEntry::modified(
        customers.clone(),
        vec![9.into(), "Ada".into()],
        vec![9.into(), "Ada".into()],
    )
    .set_modified("Name")
    .unwrap();

    let err = cluster
        .execute_transaction(vec![valid, invalid])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());
    assert_eq!(broker.append_count(), 0);

    let table = cluster.ensure_table(&orders).await.unwrap();
    assert!(!table.exists(&key(1)).await.unwrap());
}

// ============================================================================
// Lifecycle: create, update, delete, recreate
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_over_one_key() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![1.into(), 10.0.into(), "open".into()],
        )])
        .await
        .unwrap();

    cluster
        .execute_transaction(vec![{
            EntityEntry::modified(
                orders.clone(),
                vec![1.into(), 10.0.into(), "paid".into()],
                vec![1.into(), 10.0.into(), "open".into()],
            )
            .set_modified("Status")
            .unwrap()
        }])
        .await
        .unwrap();

    let table = cluster.ensure_table(&orders).await.unwrap();
    let row = table.try_get(&key(1)).await.unwrap().unwrap();
    assert_eq!(row.get(2), Some(&PropertyValue::Text("paid".into())));

    cluster
        .execute_transaction(vec![EntityEntry::deleted(
            orders.clone(),
            vec![1.into(), 10.0.into(), "paid".into()],
        )])
        .await
        .unwrap();
    assert!(!table.exists(&key(1)).await.unwrap());

    // The key is free again: a new create succeeds.
    cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![1.into(), 99.0.into(), "open".into()],
        )])
        .await
        .unwrap();
    let row = table.try_get(&key(1)).await.unwrap().unwrap();
    assert_eq!(row.get(1), Some(&99.0.into()));
}

#[tokio::test]
async fn test_auto_increment_ids_are_assigned_in_order() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    cluster
        .execute_transaction(vec![
            EntityEntry::added(
                orders.clone(),
                vec![PropertyValue::Null, 10.0.into(), "open".into()],
            ),
            EntityEntry::added(
                orders.clone(),
                vec![PropertyValue::Null, 20.0.into(), "open".into()],
            ),
        ])
        .await
        .unwrap();

    let table = cluster.ensure_table(&orders).await.unwrap();
    assert!(table.exists(&key(1)).await.unwrap());
    assert!(table.exists(&key(2)).await.unwrap());
}

// ============================================================================
// Readiness gating
// ============================================================================

#[tokio::test]
async fn test_table_is_serving_when_construction_returns() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    let table = cluster.ensure_table(&orders).await.unwrap();
    // Construction blocked on the supervisor handshake, so the pipeline
    // is past Created/Rebalancing by the time the table is handed out.
    let registry = cluster.registry();
    assert_eq!(registry.len(), 1);
    assert!(table.value_buffers().len() == 0);
}

#[tokio::test]
async fn test_view_catches_up_on_preexisting_log_before_serving() {
    // A log populated by a previous run: the replicated map must replay
    // it fully before construction returns.
    let broker = Arc::new(InMemoryLogBroker::new());
    let config = ClusterConfig {
        database_name: "shop".into(),
        min_quiet_time: Duration::from_millis(20),
        ..Default::default()
    };

    {
        let seed = Cluster::new(config.clone(), broker.clone() as Arc<dyn RecordLog>);
        let orders = order_entity();
        let mut entries = Vec::new();
        for id in 1..=50i64 {
            entries.push(EntityEntry::added(
                orders.clone(),
                vec![id.into(), (id as f64).into(), "open".into()],
            ));
        }
        seed.execute_transaction(entries).await.unwrap();
        seed.dispose().await;
    }

    let cluster = Cluster::new(config, broker as Arc<dyn RecordLog>);
    let orders = order_entity();
    let table = cluster.ensure_table(&orders).await.unwrap();
    assert_eq!(table.value_buffers().len(), 50);
}

#[tokio::test]
async fn test_streaming_view_strategy_also_serves_reads() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker, ViewStrategy::StreamingView);
    let orders = order_entity();

    cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![1.into(), 10.0.into(), "open".into()],
        )])
        .await
        .unwrap();

    // The streaming view converges by replay rather than direct
    // application; poll until the record lands.
    let table = cluster.ensure_table(&orders).await.unwrap();
    for _ in 0..200 {
        if table.exists(&key(1)).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("streaming view never converged");
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_serialize_under_the_cluster_lock() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = Arc::new(cluster_with(broker, ViewStrategy::ReplicatedMap));
    let orders = order_entity();

    // Warm the table up front so workers race on validation, not setup.
    cluster.ensure_table(&orders).await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..8i64 {
        let cluster = cluster.clone();
        let orders = orders.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10i64 {
                let id = worker * 100 + i;
                cluster
                    .execute_transaction(vec![EntityEntry::added(
                        orders.clone(),
                        vec![id.into(), 1.0.into(), "open".into()],
                    )])
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let table = cluster.ensure_table(&orders).await.unwrap();
    assert_eq!(table.value_buffers().len(), 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_on_same_key_admit_exactly_one() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = Arc::new(cluster_with(broker, ViewStrategy::ReplicatedMap));
    let orders = order_entity();
    cluster.ensure_table(&orders).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cluster = cluster.clone();
        let orders = orders.clone();
        handles.push(tokio::spawn(async move {
            cluster
                .execute_transaction(vec![EntityEntry::added(
                    orders.clone(),
                    vec![7.into(), 1.0.into(), "open".into()],
                )])
                .await
        }));
    }

    // Validation is serialized by the cluster lock, but commits land
    // outside it, so racing creates may validate before the first commit
    // is visible. What is guaranteed: at least one admission, the rest
    // fail only with concurrency conflicts, and once the key is visible
    // every later create conflicts.
    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) if e.is_concurrency_conflict() => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(successes >= 1);

    let err = cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![7.into(), 1.0.into(), "open".into()],
        )])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());
}

// ============================================================================
// Shared views
// ============================================================================

#[tokio::test]
async fn test_persistent_store_names_share_a_pipeline_across_clusters() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let registry = Arc::new(logtable::PipelineRegistry::new());
    let config = ClusterConfig {
        database_name: "shop".into(),
        persistent_stores: true,
        min_quiet_time: Duration::from_millis(20),
        ..Default::default()
    };

    let a = Cluster::new(config.clone(), broker.clone() as Arc<dyn RecordLog>)
        .with_registry(registry.clone());
    let b = Cluster::new(config, broker as Arc<dyn RecordLog>).with_registry(registry.clone());
    let orders = order_entity();

    a.ensure_table(&orders).await.unwrap();
    b.ensure_table(&orders).await.unwrap();

    // Same store id, one pipeline, two referents.
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.ref_count("Table_shop.Order"), 2);

    a.dispose().await;
    assert_eq!(registry.ref_count("Table_shop.Order"), 1);
    b.dispose().await;
    assert_eq!(registry.len(), 0);
}

// ============================================================================
// Log compaction
// ============================================================================

#[tokio::test]
async fn test_compacted_log_rebuilds_latest_state_only() {
    let broker = Arc::new(InMemoryLogBroker::new());
    let cluster = cluster_with(broker.clone(), ViewStrategy::ReplicatedMap);
    let orders = order_entity();

    cluster
        .execute_transaction(vec![EntityEntry::added(
            orders.clone(),
            vec![1.into(), 10.0.into(), "open".into()],
        )])
        .await
        .unwrap();
    for (from, to) in [("open", "packed"), ("packed", "shipped")] {
        cluster
            .execute_transaction(vec![{
                EntityEntry::modified(
                    orders.clone(),
                    vec![1.into(), 10.0.into(), to.into()],
                    vec![1.into(), 10.0.into(), from.into()],
                )
                .set_modified("Status")
                .unwrap()
            }])
            .await
            .unwrap();
    }

    broker.compact_topic("shop.Order").unwrap();

    // A fresh cluster rebuilds the view from the compacted log.
    let fresh = cluster_with(broker, ViewStrategy::ReplicatedMap);
    let table = fresh.ensure_table(&orders).await.unwrap();
    let row = table.try_get(&key(1)).await.unwrap().unwrap();
    assert_eq!(row.get(2), Some(&PropertyValue::Text("shipped".into())));
    assert_eq!(table.value_buffers().len(), 1);
}
