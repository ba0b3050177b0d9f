//! Reference-counted sharing of replay pipelines.
//!
//! Views with the same backing-store identifier share one pipeline. The
//! registry is a plain injected object (no statics) holding an explicit
//! reference count per store id; the pipeline is torn down when its last
//! handle is dropped.

use std::sync::Arc;

use dashmap::DashMap;

use super::pipeline::ReplayPipeline;

struct RegistryEntry {
    pipeline: Arc<ReplayPipeline>,
    refs: usize,
}

/// Registry of shared replay pipelines keyed by backing-store identifier.
pub struct PipelineRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Acquire a handle on the pipeline for `store_id`, building it on
    /// first use. Every handle must eventually drop; the pipeline stops
    /// when the count reaches zero.
    pub fn acquire(
        self: &Arc<Self>,
        store_id: &str,
        build: impl FnOnce() -> ReplayPipeline,
    ) -> PipelineHandle {
        let pipeline = {
            let mut entry = self
                .entries
                .entry(store_id.to_string())
                .or_insert_with(|| RegistryEntry {
                    pipeline: Arc::new(build()),
                    refs: 0,
                });
            entry.refs += 1;
            entry.pipeline.clone()
        };
        PipelineHandle {
            registry: self.clone(),
            store_id: store_id.to_string(),
            pipeline,
        }
    }

    /// Number of live pipelines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current reference count for a store id.
    pub fn ref_count(&self, store_id: &str) -> usize {
        self.entries.get(store_id).map(|e| e.refs).unwrap_or(0)
    }

    fn release(&self, store_id: &str) {
        use dashmap::mapref::entry::Entry;
        if let Entry::Occupied(mut occupied) = self.entries.entry(store_id.to_string()) {
            let entry = occupied.get_mut();
            entry.refs -= 1;
            if entry.refs == 0 {
                let (_, entry) = occupied.remove_entry();
                tracing::info!(store_id, "last referent released, stopping pipeline");
                entry.pipeline.request_stop();
            }
        }
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A counted reference to a shared pipeline. Dropping the handle releases
/// the reference; the last drop stops the pipeline.
pub struct PipelineHandle {
    registry: Arc<PipelineRegistry>,
    store_id: String,
    pipeline: Arc<ReplayPipeline>,
}

impl PipelineHandle {
    pub fn pipeline(&self) -> &Arc<ReplayPipeline> {
        &self.pipeline
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.registry.release(&self.store_id);
    }
}
