use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperstoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Batch error: {0}")]
    Batch(#[from] crate::batch::BatchError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("No extractable text in the first {pages} page(s)")]
    NoText { pages: usize },

    #[error("Extraction worker is not running")]
    WorkerUnavailable,

    #[error("Failed to spawn extraction worker: {0}")]
    SpawnFailed(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored object not found: {0}")]
    NotFound(String),

    #[error("Remote store request failed: {0}")]
    Remote(String),

    #[error("Remote store is not authorized: {0}")]
    Unauthorized(String),

    #[error("Storage is misconfigured: {0}")]
    Misconfigured(String),
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Paper not found: {0}")]
    NotFound(String),

    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Paper already exists: {0}")]
    Duplicate(String),

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("URL did not return a PDF: {0}")]
    NotPdf(String),

    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("arXiv lookup failed: {0}")]
    Arxiv(#[from] crate::arxiv::ArxivError),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("PDF metadata extraction failed: {0}")]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth2 request failed: {0}")]
    OAuth2(String),

    #[error("Device code expired before authorization")]
    Expired,

    #[error("User denied the authorization request")]
    Denied,

    #[error("No stored credentials for '{0}'")]
    NotAuthorized(String),

    #[error(transparent)]
    Secret(#[from] crate::secrets::SecretError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

impl From<AuthError> for StorageError {
    fn from(err: AuthError) -> Self {
        StorageError::Unauthorized(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaperstoreError>;
