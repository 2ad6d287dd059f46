//! Object storage for paper PDFs.
//!
//! Two backends: Google Drive (the default) and a local directory. Both sit
//! behind [`ObjectStore`] so ingestion and the batch submitter never care
//! where the bytes live.

pub mod auth;
pub mod drive;
pub mod local;
#[cfg(test)]
pub(crate) mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{StorageBackend, StorageConfig};
use crate::db::Database;
use crate::error::{AuthError, StorageError};
use crate::secrets::{expand_home, TokenEncryptor};

pub use auth::{AccessTokenSource, DeviceFlowAuth, DriveTokenProvider};
pub use drive::DriveStore;
pub use local::LocalStore;

/// Where an uploaded PDF ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Backend-specific identifier used for download and delete.
    pub file_id: String,
    /// Browser-viewable URL.
    pub view_url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredObject, StorageError>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;
}

/// Builds the configured backend.
///
/// The Drive backend needs OAuth client credentials and the token
/// encryption key up front; tokens themselves may be authorized later.
pub fn build_store(
    config: &StorageConfig,
    db: &Database,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::Local => {
            let dir = config.local_directory.as_deref().ok_or_else(|| {
                StorageError::Misconfigured("storage.local_directory is required".to_string())
            })?;
            let store = LocalStore::new(PathBuf::from(expand_home(dir)))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Drive => {
            let provider = drive_token_provider(config, db)?;
            let store = DriveStore::new(Arc::new(provider), config.drive_folder_id.clone())?;
            Ok(Arc::new(store))
        }
    }
}

/// Token provider for the Drive account, shared by the store and the
/// authorization routes.
pub fn drive_token_provider(
    config: &StorageConfig,
    db: &Database,
) -> Result<DriveTokenProvider, AuthError> {
    let client_id = config.resolve_client_id()?;
    let client_secret = config.resolve_client_secret()?;
    let encryptor = TokenEncryptor::from_env()?;
    DriveTokenProvider::new(
        db.clone(),
        encryptor,
        DeviceFlowAuth::new()?,
        client_id,
        client_secret,
    )
}
