use chrono::Utc;
use tracing::info;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{ImportCounters, RunStats};

/// Start and finish bookkeeping for import runs.
#[derive(Clone)]
pub struct RunLedger {
    repo: Repository,
}

impl RunLedger {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Open a run with zero counters.
    pub async fn begin(&self) -> Result<RunStats> {
        let run = self.repo.insert_run(Utc::now()).await?;
        info!(run_id = run.id, "Import run started");
        Ok(run)
    }

    /// Record completion time and counters. A run can only be finished once.
    pub async fn finish(&self, run: &RunStats, counters: ImportCounters) -> Result<RunStats> {
        let done = self.repo.finish_run(run.id, Utc::now(), counters).await?;
        info!(
            run_id = done.id,
            imported = counters.imported,
            skipped = counters.skipped,
            errors = counters.errors,
            duration_ms = done.duration().map(|d| d.num_milliseconds()).unwrap_or_default(),
            "Import run finished"
        );
        Ok(done)
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<RunStats>> {
        self.repo.recent_runs(limit).await
    }
}
