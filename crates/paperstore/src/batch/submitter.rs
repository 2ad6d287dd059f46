use std::sync::Arc;

use futures_util::future::join_all;
use tracing::Instrument;

use super::client::{BatchClient, BatchRequest};
use super::eligibility::is_eligible;
use super::BatchError;
use crate::db::batch_job_repo::{self, BatchJobRow};
use crate::db::{now_timestamp, paper_repo, Database};
use crate::error::ProcessError;
use crate::library::Paper;
use crate::metadata::build_prompt;
use crate::processor::ExtractionWorker;
use crate::storage::ObjectStore;

/// Turns a chunk of eligible papers into one submitted batch job.
#[derive(Clone)]
pub struct ChunkSubmitter {
    db: Database,
    store: Arc<dyn ObjectStore>,
    worker: Arc<ExtractionWorker>,
    client: Arc<dyn BatchClient>,
    max_pages: usize,
}

impl ChunkSubmitter {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        client: Arc<dyn BatchClient>,
        max_pages: usize,
    ) -> Self {
        Self {
            db,
            store,
            worker,
            client,
            max_pages,
        }
    }

    /// Prepares and submits one chunk.
    ///
    /// Papers whose file cannot be downloaded are left for a later chunk.
    /// Papers whose PDF yields no text get a skip reason and never come
    /// back. Returns `Ok(None)` when nothing survived preparation.
    pub async fn submit_chunk(&self, paper_ids: &[String]) -> Result<Option<BatchJobRow>, BatchError> {
        let span = tracing::info_span!("submit_chunk", papers = paper_ids.len());
        self.submit_chunk_inner(paper_ids).instrument(span).await
    }

    async fn submit_chunk_inner(
        &self,
        paper_ids: &[String],
    ) -> Result<Option<BatchJobRow>, BatchError> {
        let papers = self.load_papers(paper_ids)?;

        let downloads = join_all(papers.iter().map(|p| self.store.download(&p.file_id))).await;

        let mut requests = Vec::with_capacity(papers.len());
        for (paper, download) in papers.iter().zip(downloads) {
            let bytes = match download {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(paper_id = %paper.id, error = %e, "Failed to download paper; skipping for this chunk");
                    continue;
                }
            };

            match self.worker.first_pages_text(bytes, self.max_pages).await {
                Ok(text) => requests.push(BatchRequest {
                    paper_id: paper.id.clone(),
                    prompt: build_prompt(&text),
                }),
                Err(ProcessError::WorkerUnavailable) => {
                    tracing::warn!(paper_id = %paper.id, "Extraction worker unavailable; skipping for this chunk");
                }
                Err(e) => {
                    tracing::info!(paper_id = %paper.id, reason = %e, "Excluding paper from metadata extraction");
                    paper_repo::set_skip_reason(&self.db, &paper.id, &e.to_string())?;
                }
            }
        }

        if requests.is_empty() {
            tracing::debug!("No papers survived preparation");
            return Ok(None);
        }

        let member_ids: Vec<String> = requests.iter().map(|r| r.paper_id.clone()).collect();
        let handle = self.client.submit(requests).await?;

        let job = BatchJobRow::submitted(&handle, member_ids, &now_timestamp());
        batch_job_repo::insert(&self.db, &job)?;
        tracing::info!(job_id = %job.id, batch = %handle, members = job.member_ids.len(), "Batch job submitted");
        Ok(Some(job))
    }

    /// Loads the chunk in order, dropping papers that vanished or stopped
    /// being eligible since selection.
    fn load_papers(&self, paper_ids: &[String]) -> Result<Vec<Paper>, BatchError> {
        let mut papers = Vec::with_capacity(paper_ids.len());
        for id in paper_ids {
            let Some(row) = paper_repo::find_by_id(&self.db, id)? else {
                tracing::debug!(paper_id = %id, "Paper disappeared before submission");
                continue;
            };
            let paper = Paper::try_from(row)?;
            if is_eligible(&paper) {
                papers.push(paper);
            }
        }
        Ok(papers)
    }
}
