//! Shared application state for the HTTP handlers and CLI commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use secrecy::SecretString;

use paperstore::arxiv::ArxivClient;
use paperstore::config::{Config, StorageBackend};
use paperstore::db::default_database_path;
use paperstore::error::PaperstoreError;
use paperstore::secrets::expand_home;
use paperstore::storage::{build_store, drive_token_provider, DriveTokenProvider};
use paperstore::{Database, ExtractionWorker, IngestionService, Library, MetadataSupervisor, ObjectStore};

/// Pending device authorizations are dropped after this long.
const DEVICE_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// A device authorization waiting for the user to approve it.
pub struct DeviceSession {
    pub device_code: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub store: Arc<dyn ObjectStore>,
    pub library: Arc<Library>,
    pub ingest: Arc<IngestionService>,
    pub supervisor: MetadataSupervisor,
    pub worker: Arc<ExtractionWorker>,
    /// Present with the Drive backend.
    pub drive_auth: Option<Arc<DriveTokenProvider>>,
    /// True when stored files are served from `/files`.
    pub serves_files: bool,
    pub device_sessions: Cache<String, Arc<DeviceSession>>,
}

impl AppState {
    pub fn build(config: &Config) -> Result<Self, PaperstoreError> {
        let db = Database::open(&database_path(config)?)?;
        let store = build_store(&config.storage, &db)?;
        let drive_auth = match config.storage.backend {
            StorageBackend::Drive => Some(Arc::new(drive_token_provider(&config.storage, &db)?)),
            StorageBackend::Local => None,
        };
        let worker = Arc::new(ExtractionWorker::spawn()?);
        let arxiv = ArxivClient::new(&config.arxiv).map_err(paperstore::IngestError::from)?;
        let ingest = IngestionService::new(db.clone(), store.clone(), worker.clone(), arxiv)?;
        let supervisor = MetadataSupervisor::new(
            db.clone(),
            store.clone(),
            worker.clone(),
            config.gemini.clone(),
            config.batch.clone(),
        );

        Ok(Self::from_parts(
            db,
            store,
            worker,
            Arc::new(ingest),
            supervisor,
            drive_auth,
            config.storage.backend == StorageBackend::Local,
        ))
    }

    pub fn from_parts(
        db: Database,
        store: Arc<dyn ObjectStore>,
        worker: Arc<ExtractionWorker>,
        ingest: Arc<IngestionService>,
        supervisor: MetadataSupervisor,
        drive_auth: Option<Arc<DriveTokenProvider>>,
        serves_files: bool,
    ) -> Self {
        Self {
            library: Arc::new(Library::new(db.clone(), store.clone())),
            db,
            store,
            ingest,
            supervisor,
            worker,
            drive_auth,
            serves_files,
            device_sessions: Cache::builder()
                .time_to_live(DEVICE_SESSION_TTL)
                .max_capacity(64)
                .build(),
        }
    }
}

fn database_path(config: &Config) -> Result<PathBuf, PaperstoreError> {
    match config.database.path.as_deref() {
        Some(path) => Ok(PathBuf::from(expand_home(path))),
        None => default_database_path().ok_or_else(|| {
            PaperstoreError::Config(paperstore::ConfigError::Validation {
                message: "Cannot determine home directory; set database.path".to_string(),
            })
        }),
    }
}
