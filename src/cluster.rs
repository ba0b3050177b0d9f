//! The cluster: table registry and transaction orchestration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::config::ClusterConfig;
use crate::error::TableError;
use crate::log::{BrokerError, RecordLog, TopicConfig};
use crate::row::{EntityEntry, EntryState, JsonRowCodec, PendingChange, RowCodec};
use crate::schema::EntityType;
use crate::table::Table;
use crate::view::{build_retriever, PipelineRegistry};

/// Callback invoked with the rows-affected count of each transaction.
pub type AuditHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Registry of tables keyed by root entity type, one per bootstrap
/// identity. A single mutex (the cluster lock) guards table resolution
/// and row validation; the commit phase runs outside it.
pub struct Cluster {
    config: ClusterConfig,
    broker: Arc<dyn RecordLog>,
    codec: Arc<dyn RowCodec>,
    registry: Arc<PipelineRegistry>,
    tables: Mutex<HashMap<String, Arc<Table>>>,
    audit: Option<AuditHook>,
}

impl Cluster {
    pub fn new(config: ClusterConfig, broker: Arc<dyn RecordLog>) -> Self {
        Self {
            config,
            broker,
            codec: Arc::new(JsonRowCodec),
            registry: Arc::new(PipelineRegistry::new()),
            tables: Mutex::new(HashMap::new()),
            audit: None,
        }
    }

    /// Substitute the wire codec.
    pub fn with_codec(mut self, codec: Arc<dyn RowCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Share a pipeline registry with other clusters (or inject one for
    /// inspection).
    pub fn with_registry(mut self, registry: Arc<PipelineRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Install an audit hook receiving each transaction's rows-affected
    /// count.
    pub fn with_audit_hook(mut self, hook: AuditHook) -> Self {
        self.audit = Some(hook);
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Resolve the table for an entity type, creating its topic and
    /// retriever on first use. Idempotent.
    pub async fn ensure_table(&self, entity: &Arc<EntityType>) -> Result<Arc<Table>, TableError> {
        let mut tables = self.tables.lock().await;
        self.ensure_table_in(&mut tables, entity).await
    }

    /// Number of resolved tables.
    pub async fn table_count(&self) -> usize {
        self.tables.lock().await.len()
    }

    /// Drop a table from the registry. The underlying pipeline stops once
    /// every reference to the table is gone.
    pub async fn evict_table(&self, root_name: &str) -> bool {
        let removed = self.tables.lock().await.remove(root_name);
        if removed.is_some() {
            tracing::info!(table = root_name, "table evicted");
        }
        removed.is_some()
    }

    /// Drop every table. Pipelines stop as their last references go.
    pub async fn dispose(&self) {
        self.tables.lock().await.clear();
        tracing::info!("cluster disposed");
    }

    /// Validate and commit a batch of pending entries.
    ///
    /// Validation runs under the cluster lock, in input order, grouped
    /// into per-table batches; any validation failure aborts the whole
    /// transaction before a single record is appended. Commits run after
    /// the lock is released, concurrently across tables; a commit failure
    /// on one table does not roll back siblings and is reported to the
    /// caller. Returns the number of rows affected.
    pub async fn execute_transaction(
        &self,
        entries: Vec<EntityEntry>,
    ) -> Result<u64, TableError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut order: Vec<String> = Vec::new();
        let mut batches: HashMap<String, (Arc<Table>, Vec<PendingChange>)> = HashMap::new();
        let mut rows_affected: u64 = 0;

        let mut tables = self.tables.lock().await;
        for entry in &entries {
            // Shared-identity companions are deleted ahead of the entry
            // that takes over their key.
            let mut freed_key = None;
            if let Some(companion) = entry.shared_identity() {
                let table = self.ensure_table_in(&mut tables, companion.entity()).await?;
                let change = table.delete(companion).await?;
                freed_key = Some(change.key().clone());
                let root = companion.entity().root_name().to_string();
                if !batches.contains_key(&root) {
                    order.push(root.clone());
                    batches.insert(root.clone(), (table, Vec::new()));
                }
                if let Some((_, batch)) = batches.get_mut(&root) {
                    batch.push(change);
                }
                rows_affected += 1;
            }

            let table = self.ensure_table_in(&mut tables, entry.entity()).await?;
            let change = match entry.state() {
                EntryState::Added => table.create_replacing(entry, freed_key.as_ref()).await?,
                EntryState::Modified => table.update(entry).await?,
                EntryState::Deleted => table.delete(entry).await?,
                EntryState::Unchanged => continue,
            };
            let root = entry.entity().root_name().to_string();
            if !batches.contains_key(&root) {
                order.push(root.clone());
                batches.insert(root.clone(), (table, Vec::new()));
            }
            if let Some((_, batch)) = batches.get_mut(&root) {
                batch.push(change);
            }
            rows_affected += 1;
        }
        drop(tables);

        if let Some(audit) = &self.audit {
            audit(rows_affected);
        }
        tracing::info!(
            rows = rows_affected,
            tables = order.len(),
            "transaction validated"
        );

        // Commit phase: tables no longer share mutable state, so their
        // batches append concurrently.
        let mut commits = JoinSet::new();
        for root in order {
            if let Some((table, batch)) = batches.remove(&root) {
                if batch.is_empty() {
                    continue;
                }
                commits.spawn(async move { table.commit(batch).await });
            }
        }

        let mut first_error: Option<TableError> = None;
        while let Some(joined) = commits.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(TableError::CommitFailure {
                    entity: "transaction".into(),
                    reason: format!("commit task failed: {e}"),
                }),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "table commit failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(rows_affected)
    }

    async fn ensure_table_in(
        &self,
        tables: &mut HashMap<String, Arc<Table>>,
        entity: &Arc<EntityType>,
    ) -> Result<Arc<Table>, TableError> {
        if entity.is_abstract() {
            return Err(TableError::AbstractEntity(entity.name().to_string()));
        }

        let root = entity.root_name().to_string();
        if let Some(table) = tables.get(&root) {
            return Ok(table.clone());
        }

        let topic = self.config.topic_name(&root);
        match self
            .broker
            .create_topic(
                &topic,
                self.config.num_partitions,
                self.config.replication_factor,
                TopicConfig::table(),
            )
            .await
        {
            Ok(_) => {}
            // Another cluster (or a previous run) already owns the topic.
            Err(BrokerError::TopicAlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let store_id = self.config.store_name(&topic);
        let retriever = build_retriever(
            self.config.view_strategy,
            &topic,
            &store_id,
            self.broker.clone(),
            self.codec.clone(),
            &self.registry,
            self.config.min_quiet_time,
        )
        .await?;

        let table = Arc::new(Table::new(
            entity.clone(),
            topic,
            retriever,
            self.codec.clone(),
            self.config.sensitive_data_logging,
        ));
        tracing::info!(
            table = %root,
            strategy = ?self.config.view_strategy,
            "table materialized"
        );
        tables.insert(root, table.clone());
        Ok(table)
    }
}
