use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ObjectStore, StoredObject};
use crate::error::StorageError;

/// Ephemeral store for unit tests.
#[derive(Default)]
pub(crate) struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    next_id: Mutex<u64>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    pub(crate) fn contains(&self, file_id: &str) -> bool {
        self.files.lock().unwrap().contains_key(file_id)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredObject, StorageError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("mem-{}-{}", *next, filename)
        };
        self.insert(&id, bytes);
        Ok(StoredObject {
            view_url: format!("memory://{}", id),
            file_id: id,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(file_id.to_string()))
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        self.files.lock().unwrap().remove(file_id);
        Ok(())
    }
}
