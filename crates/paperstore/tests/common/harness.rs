//! Isolated environment for batch lifecycle tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use paperstore::config::BatchConfig;
use paperstore::db::batch_job_repo::{self, BatchJobRow, BatchJobState};
use paperstore::db::paper_repo::{self, PaperRow};
use paperstore::{Database, ExtractionWorker, MetadataSupervisor};

use super::fakes::{FakeBatchClient, MemoryStore};
use super::pdf::build_pdf;

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub worker: Arc<ExtractionWorker>,
    pub client: Arc<FakeBatchClient>,
    added: std::cell::Cell<u32>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("paperstore.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        Self {
            temp_dir,
            db_path,
            db,
            store: Arc::new(MemoryStore::default()),
            worker: Arc::new(ExtractionWorker::spawn().expect("Failed to spawn worker")),
            client: Arc::new(FakeBatchClient::default()),
            added: std::cell::Cell::new(0),
        }
    }

    /// Inserts a paper with only a title and a stored one-page PDF.
    /// Papers are added one second apart so selection order is stable.
    pub fn add_paper(&self, id: &str) -> PaperRow {
        self.add_paper_with(id, |_| {})
    }

    pub fn add_paper_with(&self, id: &str, edit: impl FnOnce(&mut PaperRow)) -> PaperRow {
        let n = self.added.get();
        self.added.set(n + 1);

        let mut row = PaperRow {
            id: id.to_string(),
            arxiv_id: None,
            title: Some(format!("Paper {}", id)),
            authors: vec![],
            published_date: None,
            abstract_text: None,
            submission_url: format!("https://example.org/{}.pdf", id),
            file_id: format!("file-{}", id),
            view_url: format!("memory://file-{}", id),
            metadata_skip_reason: None,
            added_at: format!("2026-01-01T00:{:02}:{:02}.000Z", n / 60, n % 60),
        };
        edit(&mut row);
        paper_repo::insert_with_note(&self.db, &row).expect("Failed to insert paper");
        let title_page = format!("Title page of {}", id);
        self.store
            .insert(&row.file_id, build_pdf(&[title_page.as_str()]));
        row
    }

    pub fn paper(&self, id: &str) -> PaperRow {
        paper_repo::find_by_id(&self.db, id)
            .expect("Failed to load paper")
            .expect("Paper not found")
    }

    pub fn jobs(&self, state: BatchJobState) -> Vec<BatchJobRow> {
        batch_job_repo::list_by_state(&self.db, state).expect("Failed to list jobs")
    }

    pub fn supervisor(&self, config: BatchConfig) -> MetadataSupervisor {
        self.supervisor_on(self.db.clone(), config)
    }

    /// A supervisor over its own connection to the same database file, as a
    /// restarted process would have.
    pub fn restarted_supervisor(&self, config: BatchConfig) -> MetadataSupervisor {
        let db = Database::open(&self.db_path).expect("Failed to reopen database");
        self.supervisor_on(db, config)
    }

    fn supervisor_on(&self, db: Database, config: BatchConfig) -> MetadataSupervisor {
        MetadataSupervisor::with_client(
            db,
            self.store.clone(),
            self.worker.clone(),
            self.client.clone(),
            config,
        )
    }
}
