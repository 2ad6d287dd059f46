use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use super::auth::AccessTokenSource;
use super::{ObjectStore, StoredObject};
use crate::error::StorageError;
use crate::sanitize::truncate_body;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com";

/// Uploads can be large and slow.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

const MULTIPART_BOUNDARY: &str = "paperstore-drive-boundary-7f3a9c";

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Embeddable preview URL of a Drive file.
pub fn preview_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/preview", file_id)
}

/// Google Drive backend over the v3 REST API.
///
/// Uploaded files are shared as "anyone with the link can read" so the
/// preview URL works in an iframe.
pub struct DriveStore {
    client: Client,
    base_url: String,
    folder_id: Option<String>,
    tokens: Arc<dyn AccessTokenSource>,
}

impl DriveStore {
    pub fn new(
        tokens: Arc<dyn AccessTokenSource>,
        folder_id: Option<String>,
    ) -> Result<Self, StorageError> {
        Self::with_base_url(tokens, folder_id, DRIVE_API_BASE)
    }

    pub fn with_base_url(
        tokens: Arc<dyn AccessTokenSource>,
        folder_id: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Remote(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            folder_id: folder_id.filter(|f| !f.is_empty()),
            tokens,
        })
    }

    fn multipart_body(&self, bytes: &[u8], filename: &str) -> Vec<u8> {
        let mut metadata = json!({
            "name": filename,
            "mimeType": "application/pdf",
        });
        if let Some(folder) = &self.folder_id {
            metadata["parents"] = json!([folder]);
        }

        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: application/pdf\r\n\r\n",
                b = MULTIPART_BOUNDARY,
                meta = metadata
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
        body
    }

    async fn share_publicly(&self, file_id: &str, token: &str) -> Result<(), StorageError> {
        let url = format!(
            "{}/drive/v3/files/{}/permissions?supportsAllDrives=true",
            self.base_url, file_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("Permission request failed: {}", e)))?;
        check_status(response, file_id).await.map(|_| ())
    }
}

/// Maps Drive error statuses onto storage errors.
async fn check_status(
    response: reqwest::Response,
    file_id: &str,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(file_id.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::Unauthorized(
            format!("Drive returned {}: {}", status, truncate_body(&body)),
        )),
        _ => Err(StorageError::Remote(format!(
            "Drive returned {}: {}",
            status,
            truncate_body(&body)
        ))),
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredObject, StorageError> {
        let token = self.tokens.access_token().await?;

        let url = format!(
            "{}/upload/drive/v3/files?uploadType=multipart&supportsAllDrives=true&fields=id,webViewLink",
            self.base_url
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(self.multipart_body(&bytes, filename))
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("Upload request failed: {}", e)))?;

        let file: DriveFile = check_status(response, filename)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Remote(format!("Invalid upload response: {}", e)))?;

        if let Err(e) = self.share_publicly(&file.id, token.expose_secret()).await {
            tracing::warn!(file_id = %file.id, error = %e, "Sharing failed, removing upload");
            if let Err(cleanup) = self.delete(&file.id).await {
                tracing::warn!(file_id = %file.id, error = %cleanup, "Failed to remove unshared upload");
            }
            return Err(e);
        }

        tracing::info!(file_id = %file.id, "Uploaded PDF to Drive");
        Ok(StoredObject {
            view_url: preview_url(&file.id),
            file_id: file.id,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/drive/v3/files/{}?alt=media&supportsAllDrives=true",
            self.base_url, file_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("Download request failed: {}", e)))?;

        let bytes = check_status(response, file_id)
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::Remote(format!("Download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/drive/v3/files/{}?supportsAllDrives=true",
            self.base_url, file_id
        );
        let response = self
            .client
            .delete(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("Delete request failed: {}", e)))?;

        match check_status(response, file_id).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
