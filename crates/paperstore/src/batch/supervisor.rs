use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::client::BatchClient;
use super::gemini::GeminiBatchClient;
use super::poller::Poller;
use super::submitter::ChunkSubmitter;
use super::BatchError;
use crate::config::{BatchConfig, GeminiConfig};
use crate::db::batch_job_repo::{self, BatchJobState};
use crate::db::{paper_repo, Database};
use crate::processor::ExtractionWorker;
use crate::storage::ObjectStore;

/// What the status endpoint reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStatus {
    pub running: bool,
    /// Papers updated since the process started.
    pub papers_done: u64,
}

enum ClientSource {
    Gemini(GeminiConfig),
    Fixed(Arc<dyn BatchClient>),
}

struct Inner {
    db: Database,
    store: Arc<dyn ObjectStore>,
    worker: Arc<ExtractionWorker>,
    config: BatchConfig,
    source: ClientSource,
    client: Mutex<Option<Arc<dyn BatchClient>>>,
    papers_done: Arc<AtomicU64>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    poller_task: Mutex<Option<JoinHandle<()>>>,
    stop: watch::Sender<bool>,
}

enum Step {
    Chunk(Vec<String>),
    Wait,
    Done,
}

/// Owns the submission loop and the shared poller.
///
/// Cheap to clone; clones share the same tasks. `start`, `stop` and
/// `resume` spawn onto the current Tokio runtime.
#[derive(Clone)]
pub struct MetadataSupervisor {
    inner: Arc<Inner>,
}

impl MetadataSupervisor {
    /// A supervisor that talks to Gemini. The config is only resolved when
    /// work is started.
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        gemini: GeminiConfig,
        config: BatchConfig,
    ) -> Self {
        Self::build(db, store, worker, ClientSource::Gemini(gemini), config)
    }

    /// A supervisor over an already built batch client.
    pub fn with_client(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        client: Arc<dyn BatchClient>,
        config: BatchConfig,
    ) -> Self {
        Self::build(db, store, worker, ClientSource::Fixed(client), config)
    }

    fn build(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        source: ClientSource,
        config: BatchConfig,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                db,
                store,
                worker,
                config,
                source,
                client: Mutex::new(None),
                papers_done: Arc::new(AtomicU64::new(0)),
                loop_task: Mutex::new(None),
                poller_task: Mutex::new(None),
                stop,
            }),
        }
    }

    fn client(&self) -> Result<Arc<dyn BatchClient>, BatchError> {
        let mut cached = self
            .inner
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = cached.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client: Arc<dyn BatchClient> = match &self.inner.source {
            ClientSource::Gemini(config) => Arc::new(GeminiBatchClient::from_config(config)?),
            ClientSource::Fixed(client) => Arc::clone(client),
        };
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }

    pub fn count_eligible(&self) -> Result<u64, BatchError> {
        Ok(paper_repo::count_eligible(&self.inner.db)?)
    }

    /// Estimated spend for `count` papers, rounded to 4 decimals.
    pub fn estimate_cost_usd(&self, count: u64) -> f64 {
        let cost = count as f64 * self.inner.config.cost_per_paper_usd;
        (cost * 10_000.0).round() / 10_000.0
    }

    pub fn status(&self) -> LoopStatus {
        let running = self
            .inner
            .loop_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        LoopStatus {
            running,
            papers_done: self.inner.papers_done.load(Ordering::Relaxed),
        }
    }

    /// Starts the submission loop unless it is already running. A stop
    /// requested earlier is cancelled either way.
    ///
    /// Fails only when no batch client can be built.
    pub fn start(&self) -> Result<LoopStatus, BatchError> {
        let client = self.client()?;
        {
            let mut task = self
                .inner
                .loop_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.stop.send_replace(false);
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                tracing::debug!("Metadata loop already running");
            } else {
                let stop = self.inner.stop.subscribe();
                let submitter = ChunkSubmitter::new(
                    self.inner.db.clone(),
                    Arc::clone(&self.inner.store),
                    Arc::clone(&self.inner.worker),
                    Arc::clone(&client),
                    self.inner.config.max_pages,
                );
                let this = self.clone();
                *task = Some(tokio::spawn(this.run_loop(submitter, client, stop)));
                tracing::info!(
                    chunk_size = self.inner.config.chunk_size,
                    max_in_flight = self.inner.config.max_in_flight_jobs,
                    "Started metadata loop"
                );
            }
        }
        Ok(self.status())
    }

    /// Asks the loop to exit after its current chunk. Submitted jobs keep
    /// being polled.
    pub fn stop(&self) -> LoopStatus {
        self.inner.stop.send_replace(true);
        tracing::info!("Stop requested for metadata loop");
        self.status()
    }

    /// Re-attaches jobs left in `submitted` by a previous process. Returns
    /// how many there are.
    pub fn resume(&self) -> Result<u64, BatchError> {
        let pending = batch_job_repo::count_by_state(&self.inner.db, BatchJobState::Submitted)?;
        if pending == 0 {
            return Ok(0);
        }
        let client = self.client()?;
        tracing::info!(jobs = pending, "Resuming submitted batch jobs");
        self.ensure_poller(&client);
        Ok(pending)
    }

    /// A poller sharing this supervisor's client and counter.
    pub fn poller(&self) -> Result<Poller, BatchError> {
        Ok(Poller::new(
            self.inner.db.clone(),
            self.client()?,
            Arc::clone(&self.inner.papers_done),
        ))
    }

    /// Whether the shared poller task is alive.
    pub fn poller_running(&self) -> bool {
        self.inner
            .poller_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn ensure_poller(&self, client: &Arc<dyn BatchClient>) {
        let mut task = self
            .inner
            .poller_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let poller = Poller::new(
            self.inner.db.clone(),
            Arc::clone(client),
            Arc::clone(&self.inner.papers_done),
        );
        let interval = Duration::from_secs(self.inner.config.poll_interval_secs);
        *task = Some(tokio::spawn(poller.run(interval)));
    }

    async fn run_loop(
        self,
        submitter: ChunkSubmitter,
        client: Arc<dyn BatchClient>,
        mut stop: watch::Receiver<bool>,
    ) {
        let pause = Duration::from_secs(self.inner.config.loop_interval_secs);
        let mut attempted: Vec<String> = Vec::new();

        loop {
            if *stop.borrow_and_update() {
                tracing::info!("Metadata loop stopped on request");
                break;
            }

            match self.next_step(&client, &attempted) {
                Ok(Step::Done) => {
                    tracing::info!(attempted = attempted.len(), "No eligible papers left to submit");
                    break;
                }
                Ok(Step::Chunk(ids)) => {
                    attempted.extend(ids.iter().cloned());
                    match submitter.submit_chunk(&ids).await {
                        Ok(Some(_)) => self.ensure_poller(&client),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "Chunk submission failed"),
                    }
                    continue;
                }
                Ok(Step::Wait) => {
                    tracing::debug!("In-flight job limit reached; waiting");
                }
                Err(e) => tracing::error!(error = %e, "Failed to select next chunk"),
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop.changed() => {}
            }
        }
    }

    fn next_step(
        &self,
        client: &Arc<dyn BatchClient>,
        attempted: &[String],
    ) -> Result<Step, BatchError> {
        let in_flight = batch_job_repo::count_by_state(&self.inner.db, BatchJobState::Submitted)?;
        if in_flight > 0 {
            self.ensure_poller(client);
        }
        if in_flight >= self.inner.config.max_in_flight_jobs.max(1) as u64 {
            return Ok(Step::Wait);
        }

        let ids = paper_repo::list_eligible_ids(
            &self.inner.db,
            self.inner.config.chunk_size.max(1),
            attempted,
        )?;
        if ids.is_empty() {
            Ok(Step::Done)
        } else {
            Ok(Step::Chunk(ids))
        }
    }
}
