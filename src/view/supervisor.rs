//! The stream supervisor: lifecycle states and readiness gating.
//!
//! The replay pipeline publishes its lifecycle through a watch channel;
//! the supervisor only reacts to those transitions, it never invents
//! states. A background watcher decides when the caller waiting on
//! construction may proceed, and completes a single-shot channel exactly
//! once — ready, failed, or terminated — so construction either returns a
//! serving view or fails loudly.

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::error::TableError;

use super::pipeline::PipelineCore;
use std::sync::Arc;

/// Lifecycle state of a replay pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotRunning,
    Created,
    Rebalancing,
    Running,
    PendingShutdown,
    PendingError,
    /// Terminal failure state.
    Error,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotRunning => "not-running",
            Self::Created => "created",
            Self::Rebalancing => "rebalancing",
            Self::Running => "running",
            Self::PendingShutdown => "pending-shutdown",
            Self::PendingError => "pending-error",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// How the watcher decides the view is ready to serve reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessMode {
    /// Ready once the pipeline is running and no record has arrived for
    /// an adaptive quiet window (minimum quiet time plus the last
    /// observed inter-arrival gap).
    ///
    /// Approximate against an unbounded log: records arriving after the
    /// window elapsed are read as a later state of the view, not an
    /// error. Callers wanting reads with no such window should use the
    /// continuously-replicated map strategy.
    QuietWindow,
    /// Ready as soon as the pipeline reports running.
    RunningOnly,
}

/// Gates readers on one pipeline's readiness.
pub struct StreamSupervisor {
    store_id: String,
    state_rx: watch::Receiver<PipelineState>,
    core: Arc<PipelineCore>,
    mode: ReadinessMode,
    /// Minimum quiet time; the adaptive window never waits less than this.
    min_quiet_time: Duration,
}

impl StreamSupervisor {
    pub(crate) fn new(
        core: Arc<PipelineCore>,
        state_rx: watch::Receiver<PipelineState>,
        mode: ReadinessMode,
        min_quiet_time: Duration,
    ) -> Self {
        Self {
            store_id: core.store_id().to_string(),
            state_rx,
            core,
            mode,
            min_quiet_time,
        }
    }

    /// Spawn the watcher and block until it reports the view ready or
    /// failed. Failures captured while watching are rethrown here, to the
    /// caller constructing the retriever.
    pub async fn wait_until_ready(self) -> Result<(), TableError> {
        let store_id = self.store_id.clone();
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(self.watch(started_tx, done_tx));

        // The watcher is subscribed before we wait on its verdict.
        let _ = started_rx.await;

        match done_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => {
                tracing::warn!(store_id = %store_id, %reason, "pipeline startup failed");
                Err(TableError::PipelineStartupFailure { store_id, reason })
            }
            Err(_) => Err(TableError::PipelineStartupFailure {
                store_id,
                reason: "readiness watcher terminated unexpectedly".into(),
            }),
        }
    }

    async fn watch(
        mut self,
        started: oneshot::Sender<()>,
        done: oneshot::Sender<Result<(), String>>,
    ) {
        let _ = started.send(());
        let result = self.run_watcher().await;
        // Completed exactly once, on every exit path.
        let _ = done.send(result);
    }

    async fn run_watcher(&mut self) -> Result<(), String> {
        let core = self.core.clone();
        let mut last_arrival: Option<Instant> = None;
        let mut last_gap = Duration::ZERO;

        loop {
            let state = *self.state_rx.borrow_and_update();
            // The wait starts infinite and becomes the adaptive quiet
            // window once the pipeline runs.
            let wait: Option<Duration> = match state {
                PipelineState::Created | PipelineState::Rebalancing => None,
                PipelineState::Running => match self.mode {
                    ReadinessMode::RunningOnly => return Ok(()),
                    ReadinessMode::QuietWindow => Some(self.min_quiet_time + last_gap),
                },
                PipelineState::NotRunning | PipelineState::PendingShutdown => {
                    return Err(format!("pipeline stopped before serving (state {state})"));
                }
                PipelineState::PendingError | PipelineState::Error => {
                    return Err(self.failure_reason());
                }
            };

            let wake = tokio::select! {
                changed = self.state_rx.changed() => Wake::State(changed.is_ok()),
                _ = core.data().notified() => Wake::Data,
                _ = maybe_sleep(wait) => Wake::Quiet,
            };
            match wake {
                Wake::State(true) => {}
                Wake::State(false) => return Err(self.failure_reason()),
                Wake::Data => {
                    let now = Instant::now();
                    if let Some(prev) = last_arrival {
                        last_gap = now.duration_since(prev);
                    }
                    last_arrival = Some(now);
                }
                Wake::Quiet => {
                    if state == PipelineState::Running {
                        // The stream went quiet for the whole window:
                        // replay has caught up enough to read.
                        return Ok(());
                    }
                }
            }
        }
    }

    fn failure_reason(&self) -> String {
        self.core
            .failure()
            .unwrap_or_else(|| "pipeline entered a failure state".into())
    }
}

enum Wake {
    /// A lifecycle transition (false when the pipeline itself is gone).
    State(bool),
    /// A record batch was applied.
    Data,
    /// The adaptive quiet window elapsed.
    Quiet,
}

async fn maybe_sleep(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
