//! Cluster configuration and derived naming.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::view::ViewStrategy;

/// Configuration for one cluster (one bootstrap/connection identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Connection identity of the backing log. Clusters are one per
    /// distinct identity.
    pub bootstrap_id: String,
    /// Database name, the first component of every topic name.
    pub database_name: String,
    /// Process name used to isolate ephemeral store identifiers. The
    /// default carries a per-run unique suffix so two ephemeral runs of
    /// the same binary cannot collide.
    pub process_name: String,
    /// Materialization strategy resolved once per entity type.
    pub view_strategy: ViewStrategy,
    /// Whether store identifiers are stable across runs. When disabled,
    /// store names are prefixed with `process_name`.
    pub persistent_stores: bool,
    /// Minimum quiet time for the push strategy's readiness window.
    pub min_quiet_time: Duration,
    /// Partition count for newly created table topics.
    pub num_partitions: u32,
    /// Replication factor for newly created table topics.
    pub replication_factor: u16,
    /// When enabled, errors and logs include key and property values.
    pub sensitive_data_logging: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_id: "logtable-local".into(),
            database_name: "logtable".into(),
            process_name: format!("logtable-{}", Uuid::new_v4().simple()),
            view_strategy: ViewStrategy::ReplicatedMap,
            persistent_stores: false,
            min_quiet_time: Duration::from_millis(250),
            num_partitions: 1,
            replication_factor: 1,
            sensitive_data_logging: false,
        }
    }
}

impl ClusterConfig {
    /// Topic name for an entity type's root: `{database}.{entity}`.
    /// Reproduced bit-for-bit for interoperability within a deployment.
    pub fn topic_name(&self, entity_root: &str) -> String {
        format!("{}.{}", self.database_name, entity_root)
    }

    /// Backing-store identifier for a topic: `Table_{topic}`, prefixed
    /// with the process name when persistence is disabled.
    pub fn store_name(&self, topic: &str) -> String {
        if self.persistent_stores {
            format!("Table_{topic}")
        } else {
            format!("{}_Table_{}", self.process_name, topic)
        }
    }
}
