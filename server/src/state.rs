use dashmap::DashMap;
use listing_pipeline::Pipeline;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a finished run stays pollable.
pub const RUN_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Serialize, Debug)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Done { summary: Value },
    Failed { error: String },
}

#[derive(Clone, Debug)]
pub struct RunEntry {
    pub status: RunStatus,
    pub finished_at: Option<Instant>,
}

impl RunEntry {
    pub fn pending() -> Self {
        RunEntry {
            status: RunStatus::Pending,
            finished_at: None,
        }
    }

    pub fn finished(status: RunStatus) -> Self {
        RunEntry {
            status,
            finished_at: Some(Instant::now()),
        }
    }
}

/// run_id → RunEntry, plus the pipeline every run goes through.
#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<DashMap<Uuid, RunEntry>>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        AppState {
            runs: Arc::new(DashMap::new()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Drops runs that finished more than `RUN_RETENTION` before `now`.
    /// Pending runs are always kept.
    pub fn prune_finished(&self, now: Instant) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, entry| match entry.finished_at {
            Some(at) => now.saturating_duration_since(at) <= RUN_RETENTION,
            None => true,
        });
        before - self.runs.len()
    }
}
