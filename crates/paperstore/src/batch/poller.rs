use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::Instrument;

use super::client::{BatchClient, BatchItemResult, BatchStatus};
use super::BatchError;
use crate::db::batch_job_repo::{self, BatchJobRow, BatchJobState};
use crate::db::{now_timestamp, Database, DatabaseError};
use crate::metadata::{apply_to_paper, parse_metadata};

/// Result of one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Jobs closed during this tick.
    pub resolved: usize,
    /// Papers updated during this tick.
    pub applied: u64,
    /// Jobs still waiting afterwards.
    pub remaining: u64,
}

/// Resolves every `submitted` job against the batch service.
#[derive(Clone)]
pub struct Poller {
    db: Database,
    client: Arc<dyn BatchClient>,
    papers_done: Arc<AtomicU64>,
}

impl Poller {
    pub fn new(db: Database, client: Arc<dyn BatchClient>, papers_done: Arc<AtomicU64>) -> Self {
        Self {
            db,
            client,
            papers_done,
        }
    }

    /// One tick: query every submitted job and close the finished ones.
    ///
    /// A failing status query leaves its job for the next tick.
    pub async fn poll_once(&self) -> Result<PollOutcome, BatchError> {
        let jobs = batch_job_repo::list_by_state(&self.db, BatchJobState::Submitted)?;
        let span = tracing::info_span!("poll_tick", jobs = jobs.len());

        async {
            let statuses =
                join_all(jobs.iter().map(|job| self.client.status(&job.external_name))).await;

            let mut outcome = PollOutcome::default();
            for (job, status) in jobs.iter().zip(statuses) {
                match status {
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, batch = %job.external_name, error = %e, "Batch status check failed");
                    }
                    Ok(status) if !status.state.is_terminal() => {
                        tracing::debug!(job_id = %job.id, state = ?status.state, "Batch job still in progress");
                    }
                    Ok(status) => match self.resolve(job, status) {
                        Ok(Some(applied)) => {
                            outcome.resolved += 1;
                            outcome.applied += applied;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(job_id = %job.id, error = %e, "Failed to resolve batch job; retrying next tick");
                        }
                    },
                }
            }

            outcome.remaining =
                batch_job_repo::count_by_state(&self.db, BatchJobState::Submitted)?;
            Ok::<_, BatchError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Closes a finished job. Returns the number of papers applied, or
    /// `None` if another poller closed it first.
    fn resolve(&self, job: &BatchJobRow, status: BatchStatus) -> Result<Option<u64>, BatchError> {
        let completed_at = now_timestamp();

        if !status.state.is_success() {
            tracing::warn!(job_id = %job.id, batch = %job.external_name, state = ?status.state, "Batch job did not succeed");
            let closed = batch_job_repo::mark_failed(&self.db, &job.id, &completed_at)?;
            return Ok(closed.then_some(0));
        }

        let results = status.results.unwrap_or_default();
        let applied = apply_results(&self.db, job, &results)?;
        if !batch_job_repo::mark_applied(&self.db, &job.id, applied, &completed_at)? {
            return Ok(None);
        }

        self.papers_done.fetch_add(applied, Ordering::Relaxed);
        tracing::info!(job_id = %job.id, applied, results = results.len(), "Applied batch results");
        Ok(Some(applied))
    }

    /// Ticks every `interval` until no job is left in `submitted`.
    pub async fn run(self, interval: Duration) {
        tracing::info!(interval_secs = interval.as_secs(), "Batch poller started");
        loop {
            tokio::time::sleep(interval).await;
            match self.poll_once().await {
                Ok(outcome) if outcome.remaining == 0 => break,
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Batch poll tick failed"),
            }
        }
        tracing::info!("Batch poller stopped; no submitted jobs remain");
    }
}

/// Applies results to the job's members by position.
///
/// Result *i* belongs to member *i*; results past the member list and
/// per-entry errors are skipped. A result counts as applied when it has
/// text and its paper still exists.
pub fn apply_results(
    db: &Database,
    job: &BatchJobRow,
    results: &[BatchItemResult],
) -> Result<u64, DatabaseError> {
    if results.len() > job.member_ids.len() {
        tracing::warn!(
            job_id = %job.id,
            results = results.len(),
            members = job.member_ids.len(),
            "Batch returned more results than requests; ignoring the extra"
        );
    }

    let mut applied = 0;
    for (paper_id, result) in job.member_ids.iter().zip(results) {
        let text = match result {
            BatchItemResult::Error(message) => {
                tracing::warn!(job_id = %job.id, paper_id = %paper_id, error = %message, "Batch entry failed");
                continue;
            }
            BatchItemResult::Text(text) if text.trim().is_empty() => continue,
            BatchItemResult::Text(text) => text,
        };

        let metadata = parse_metadata(text);
        if apply_to_paper(db, paper_id, &metadata)? {
            applied += 1;
        } else {
            tracing::debug!(paper_id = %paper_id, "Paper was deleted before its result arrived");
        }
    }
    Ok(applied)
}
