pub mod arxiv;
pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod library;
pub mod metadata;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod storage;

pub use batch::{BatchClient, BatchError, GeminiBatchClient, LoopStatus, MetadataSupervisor};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    AuthError, ConfigError, IngestError, LibraryError, PaperstoreError, ProcessError, Result,
    StorageError,
};
pub use ingest::IngestionService;
pub use library::Library;
pub use metadata::{normalize_date, parse_metadata, ExtractedMetadata};
pub use processor::ExtractionWorker;
pub use storage::{ObjectStore, StoredObject};
