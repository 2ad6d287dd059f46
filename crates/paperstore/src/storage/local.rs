use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ObjectStore, StoredObject};
use crate::error::StorageError;

/// Default URL prefix under which the server exposes locally stored files.
pub const DEFAULT_PUBLIC_BASE: &str = "/files";

/// Stores PDFs as plain files in one directory.
///
/// The file id is the stored filename. View URLs point at the server's
/// file route.
pub struct LocalStore {
    root: PathBuf,
    public_base: String,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::CreateDirectory {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self {
            root,
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
        })
    }

    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` under the first free name among `name`, `name_2`,
    /// `name_3`, ... using exclusive creation.
    fn write_unique(&self, filename: &str, content: &[u8]) -> Result<String, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot) => (&filename[..dot], Some(&filename[dot..])),
            None => (filename, None),
        };

        for counter in 1..=1000 {
            let candidate = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let path = self.root.join(&candidate);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: path.clone(),
                            source: e,
                        })?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::WriteFile {
            path: self.root.join(filename),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free filename after 1000 attempts",
            ),
        })
    }

    /// Maps a file id to a path inside the root, rejecting anything that
    /// could escape it.
    fn resolve(&self, file_id: &str) -> Result<PathBuf, StorageError> {
        if file_id.is_empty()
            || file_id.contains('/')
            || file_id.contains('\\')
            || file_id.starts_with('.')
        {
            return Err(StorageError::NotFound(file_id.to_string()));
        }
        Ok(self.root.join(file_id))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredObject, StorageError> {
        let filename = filename.replace(' ', "_");
        let file_id = self.write_unique(&filename, &bytes)?;
        log::debug!("Stored {} bytes as {}", bytes.len(), file_id);
        Ok(StoredObject {
            view_url: format!("{}/{}", self.public_base, file_id),
            file_id,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_id.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFile { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        let stored = store
            .upload(b"%PDF-1.5 body".to_vec(), "Deep Nets.pdf")
            .await
            .unwrap();
        assert_eq!(stored.file_id, "Deep_Nets.pdf");
        assert_eq!(stored.view_url, "/files/Deep_Nets.pdf");

        let bytes = store.download(&stored.file_id).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.5 body");

        store.delete(&stored.file_id).await.unwrap();
        assert!(matches!(
            store.download(&stored.file_id).await,
            Err(StorageError::NotFound(_))
        ));
        // Deleting twice is fine.
        store.delete(&stored.file_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_name_conflicts_get_numbered() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path())
            .unwrap()
            .with_public_base("http://localhost:8000/files/");

        let first = store.upload(b"a".to_vec(), "paper.pdf").await.unwrap();
        let second = store.upload(b"b".to_vec(), "paper.pdf").await.unwrap();
        assert_eq!(first.file_id, "paper.pdf");
        assert_eq!(second.file_id, "paper_2.pdf");
        assert_eq!(second.view_url, "http://localhost:8000/files/paper_2.pdf");
        assert_eq!(store.download("paper.pdf").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("nested")).unwrap();
        for id in ["../secret", "..", "a/b.pdf", ""] {
            assert!(matches!(
                store.download(id).await,
                Err(StorageError::NotFound(_))
            ));
        }
    }
}
