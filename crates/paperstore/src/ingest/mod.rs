//! Paper ingestion: fetch, upload, persist.
//!
//! A record is only written after the PDF is safely in the object store, so
//! a failed upload never leaves a half-created paper behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use walkdir::WalkDir;

use crate::arxiv::{extract_arxiv_id, is_arxiv_url, ArxivClient};
use crate::db::paper_repo::{self, PaperRow};
use crate::db::{now_timestamp, Database};
use crate::error::{IngestError, ProcessError};
use crate::library::Paper;
use crate::processor::{ExtractionWorker, PdfInfo};
use crate::sanitize::{pdf_filename, redact_url, truncate_body};
use crate::storage::ObjectStore;

const PDF_MAGIC: &[u8] = b"%PDF";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata gathered before upload.
#[derive(Debug, Default)]
struct Draft {
    arxiv_id: Option<String>,
    title: Option<String>,
    authors: Vec<String>,
    published_date: Option<String>,
    abstract_text: Option<String>,
}

impl From<PdfInfo> for Draft {
    fn from(info: PdfInfo) -> Self {
        Self {
            title: info.title,
            authors: info.authors,
            ..Default::default()
        }
    }
}

/// Outcome of a directory import.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<PathBuf>,
    pub duplicates: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct IngestionService {
    db: Database,
    store: Arc<dyn ObjectStore>,
    worker: Arc<ExtractionWorker>,
    arxiv: ArxivClient,
    http: Client,
}

impl IngestionService {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        arxiv: ArxivClient,
    ) -> Result<Self, IngestError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("paperstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Fetch {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            db,
            store,
            worker,
            arxiv,
            http,
        })
    }

    /// Adds a paper from an arXiv page URL or a direct PDF URL.
    pub async fn ingest(&self, url: &str) -> Result<Paper, IngestError> {
        let url = url.trim();
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(IngestError::InvalidUrl(url.to_string())),
        }

        if paper_repo::find_by_submission_url(&self.db, url)?.is_some() {
            return Err(IngestError::Duplicate(url.to_string()));
        }

        let (draft, bytes) = if is_arxiv_url(url) {
            let arxiv_id = extract_arxiv_id(url)?;
            if paper_repo::find_by_arxiv_id(&self.db, &arxiv_id)?.is_some() {
                return Err(IngestError::Duplicate(format!("arXiv:{}", arxiv_id)));
            }
            let meta = self.arxiv.fetch(&arxiv_id).await?;
            let bytes = self.download_pdf(&self.arxiv.pdf_url(&arxiv_id)).await?;
            let draft = Draft {
                arxiv_id: Some(meta.arxiv_id),
                title: Some(meta.title).filter(|t| !t.is_empty()),
                authors: meta.authors,
                published_date: meta.published_date.map(|d| d.format("%Y-%m-%d").to_string()),
                abstract_text: Some(meta.abstract_text).filter(|a| !a.is_empty()),
            };
            (draft, bytes)
        } else {
            let bytes = self.download_pdf(url).await?;
            let draft = Draft::from(self.read_info(&bytes).await?);
            (draft, bytes)
        };

        self.store_paper(url.to_string(), draft, bytes).await
    }

    /// Adds a PDF from the local filesystem. The submission URL is the
    /// file's absolute `file://` URL.
    pub async fn ingest_local(&self, path: &Path) -> Result<Paper, IngestError> {
        let absolute = std::fs::canonicalize(path).map_err(|e| IngestError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let submission_url = reqwest::Url::from_file_path(&absolute)
            .map_err(|_| IngestError::InvalidUrl(absolute.display().to_string()))?
            .to_string();

        if paper_repo::find_by_submission_url(&self.db, &submission_url)?.is_some() {
            return Err(IngestError::Duplicate(submission_url));
        }

        let bytes = tokio::fs::read(&absolute)
            .await
            .map_err(|e| IngestError::ReadFile {
                path: absolute.clone(),
                source: e,
            })?;
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(IngestError::NotPdf(absolute.display().to_string()));
        }

        let draft = Draft::from(self.read_info(&bytes).await?);
        self.store_paper(submission_url, draft, bytes).await
    }

    /// Ingests every `*.pdf` below `dir`, one at a time.
    pub async fn import_directory(&self, dir: &Path) -> Result<ImportReport, IngestError> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        files.sort();

        tracing::info!(dir = %dir.display(), count = files.len(), "Importing PDFs");

        let mut report = ImportReport::default();
        for path in files {
            match self.ingest_local(&path).await {
                Ok(paper) => {
                    tracing::info!(path = %path.display(), paper_id = %paper.id, "Imported");
                    report.imported.push(path);
                }
                Err(IngestError::Duplicate(_)) => {
                    tracing::debug!(path = %path.display(), "Already in library");
                    report.duplicates.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Import failed");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Fetches a URL and checks that the body is a PDF.
    async fn download_pdf(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let safe_url = redact_url(url);
        tracing::debug!(url = %safe_url, "Downloading PDF");

        let fetch_error = |reason: String| IngestError::Fetch {
            url: safe_url.clone(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fetch_error(format!("{}: {}", status, truncate_body(&body))));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !content_type.contains("pdf") && !bytes.starts_with(PDF_MAGIC) {
            return Err(IngestError::NotPdf(format!(
                "{} (content-type: {:?})",
                safe_url, content_type
            )));
        }
        Ok(bytes.to_vec())
    }

    /// Best-effort Info dictionary read; an unreadable PDF yields no
    /// metadata rather than an error.
    async fn read_info(&self, bytes: &[u8]) -> Result<PdfInfo, IngestError> {
        match self.worker.info(bytes.to_vec()).await {
            Ok(info) => Ok(info),
            Err(ProcessError::WorkerUnavailable) => Err(ProcessError::WorkerUnavailable.into()),
            Err(e) => {
                tracing::debug!(error = %e, "No PDF info metadata");
                Ok(PdfInfo::default())
            }
        }
    }

    async fn store_paper(
        &self,
        submission_url: String,
        draft: Draft,
        bytes: Vec<u8>,
    ) -> Result<Paper, IngestError> {
        let filename = pdf_filename(draft.title.as_deref().unwrap_or(crate::library::model::UNTITLED));
        let stored = self.store.upload(bytes, &filename).await?;

        let row = PaperRow {
            id: uuid::Uuid::new_v4().to_string(),
            arxiv_id: draft.arxiv_id,
            title: draft.title,
            authors: draft.authors,
            published_date: draft.published_date,
            abstract_text: draft.abstract_text,
            submission_url,
            file_id: stored.file_id,
            view_url: stored.view_url,
            metadata_skip_reason: None,
            added_at: now_timestamp(),
        };

        if let Err(e) = paper_repo::insert_with_note(&self.db, &row) {
            if let Err(cleanup) = self.store.delete(&row.file_id).await {
                tracing::warn!(file_id = %row.file_id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        tracing::info!(paper_id = %row.id, submission_url = %redact_url(&row.submission_url), "Added paper");
        Ok(Paper::try_from(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arxiv::parser::tests::ATTENTION_XML;
    use crate::db::paper_repo::tests::test_db;
    use crate::db::note_repo;
    use crate::processor::pdf::tests::build_pdf;
    use crate::storage::memory::MemoryStore;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    struct Fixture {
        service: IngestionService,
        db: Database,
        store: Arc<MemoryStore>,
    }

    fn fixture(server: &Server) -> Fixture {
        let db = test_db();
        let store = Arc::new(MemoryStore::default());
        let worker = Arc::new(ExtractionWorker::spawn().unwrap());
        let arxiv = ArxivClient::with_urls(
            &format!("{}/api/query", server.url()),
            &format!("{}/pdf", server.url()),
        )
        .unwrap();
        let service = IngestionService::new(db.clone(), store.clone(), worker, arxiv).unwrap();
        Fixture { service, db, store }
    }

    #[tokio::test]
    async fn test_ingest_direct_pdf_uses_info_dictionary() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/papers/a.pdf")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body(build_pdf(&["Body"], Some(("Sparse Models", "A. One; B. Two"))))
            .create_async()
            .await;
        let fx = fixture(&server);

        let url = format!("{}/papers/a.pdf", server.url());
        let paper = fx.service.ingest(&url).await.unwrap();

        assert_eq!(paper.title.as_deref(), Some("Sparse Models"));
        assert_eq!(paper.authors, vec!["A. One", "B. Two"]);
        assert_eq!(paper.submission_url, url);
        assert!(paper.file_id.ends_with("Sparse Models.pdf"));
        assert!(fx.store.contains(&paper.file_id));
        assert_eq!(
            note_repo::find(&fx.db, &paper.id).unwrap().unwrap().content,
            ""
        );

        assert!(matches!(
            fx.service.ingest(&url).await,
            Err(IngestError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_pdf() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/page.html")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;
        let fx = fixture(&server);

        let result = fx
            .service
            .ingest(&format!("{}/page.html", server.url()))
            .await;
        assert!(matches!(result, Err(IngestError::NotPdf(_))));
        assert!(paper_repo::list_all(&fx.db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_urls_and_http_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/missing.pdf")
            .with_status(404)
            .create_async()
            .await;
        let fx = fixture(&server);

        assert!(matches!(
            fx.service.ingest("ftp://example.org/x.pdf").await,
            Err(IngestError::InvalidUrl(_))
        ));
        assert!(matches!(
            fx.service
                .ingest(&format!("{}/missing.pdf", server.url()))
                .await,
            Err(IngestError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_ingest_local_and_import_directory() {
        let server = Server::new_async().await;
        let fx = fixture(&server);
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("one.pdf"),
            build_pdf(&["x"], Some(("Local One", "Author"))),
        )
        .unwrap();
        std::fs::write(dir.path().join("nested/two.PDF"), build_pdf(&["y"], None)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("fake.pdf"), "not a pdf").unwrap();

        let paper = fx
            .service
            .ingest_local(&dir.path().join("one.pdf"))
            .await
            .unwrap();
        assert!(paper.submission_url.starts_with("file:///"));
        assert!(paper.submission_url.ends_with("one.pdf"));
        assert_eq!(paper.title.as_deref(), Some("Local One"));

        let report = fx.service.import_directory(dir.path()).await.unwrap();
        assert_eq!(report.imported.len(), 1);
        assert!(report.imported[0].ends_with("nested/two.PDF"));
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("fake.pdf"));

        let untitled = paper_repo::list_all(&fx.db)
            .unwrap()
            .into_iter()
            .find(|p| p.submission_url.ends_with("two.PDF"))
            .unwrap();
        assert_eq!(untitled.title, None);
    }

    #[tokio::test]
    async fn test_ingest_arxiv_url() {
        let mut server = Server::new_async().await;
        let api = server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded(
                "id_list".to_string(),
                "1706.03762".to_string(),
            ))
            .with_status(200)
            .with_body(ATTENTION_XML)
            .expect(1)
            .create_async()
            .await;
        let pdf = server
            .mock("GET", "/pdf/1706.03762")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(build_pdf(&["Attention"], None))
            .expect(1)
            .create_async()
            .await;
        let fx = fixture(&server);

        let paper = fx
            .service
            .ingest("https://arxiv.org/abs/1706.03762v7")
            .await
            .unwrap();
        api.assert_async().await;
        pdf.assert_async().await;

        assert_eq!(paper.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(paper.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(
            paper.published_date,
            chrono::NaiveDate::from_ymd_opt(2017, 6, 12)
        );
        assert!(paper.abstract_text.is_some());

        // A different URL form of the same paper is a duplicate.
        assert!(matches!(
            fx.service.ingest("https://arxiv.org/pdf/1706.03762").await,
            Err(IngestError::Duplicate(_))
        ));
    }
}
