#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use paperstore::batch::{BatchClient, BatchItemResult, BatchRequest, BatchState, BatchStatus};
use paperstore::{BatchError, ObjectStore, StorageError, StoredObject};

/// Object store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn insert(&self, file_id: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredObject, StorageError> {
        let file_id = format!("mem-{}", filename);
        self.insert(&file_id, bytes);
        Ok(StoredObject {
            view_url: format!("memory://{}", file_id),
            file_id,
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

/// Batch service whose job states are set by the test.
///
/// Jobs are named `batches/1`, `batches/2`, ... and stay `Running` until
/// the test scripts an outcome.
#[derive(Default)]
pub struct FakeBatchClient {
    submitted: Mutex<Vec<(String, Vec<BatchRequest>)>>,
    statuses: Mutex<HashMap<String, Result<BatchStatus, String>>>,
    refuse_submissions: Mutex<bool>,
}

impl FakeBatchClient {
    pub fn submitted(&self) -> Vec<(String, Vec<BatchRequest>)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn member_ids(&self, handle: &str) -> Vec<String> {
        self.submitted()
            .into_iter()
            .find(|(h, _)| h == handle)
            .map(|(_, requests)| requests.into_iter().map(|r| r.paper_id).collect())
            .unwrap_or_default()
    }

    pub fn succeed(&self, handle: &str, results: Vec<BatchItemResult>) {
        self.set(
            handle,
            Ok(BatchStatus {
                state: BatchState::Succeeded,
                results: Some(results),
            }),
        );
    }

    pub fn finish_with(&self, handle: &str, state: BatchState) {
        self.set(handle, Ok(BatchStatus::in_progress(state)));
    }

    pub fn break_status(&self, handle: &str) {
        self.set(handle, Err("connection reset".to_string()));
    }

    pub fn refuse_submissions(&self, refuse: bool) {
        *self.refuse_submissions.lock().unwrap() = refuse;
    }

    fn set(&self, handle: &str, status: Result<BatchStatus, String>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(handle.to_string(), status);
    }
}

#[async_trait]
impl BatchClient for FakeBatchClient {
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, BatchError> {
        if *self.refuse_submissions.lock().unwrap() {
            return Err(BatchError::Submit("quota exceeded".to_string()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        let handle = format!("batches/{}", submitted.len() + 1);
        submitted.push((handle.clone(), requests));
        Ok(handle)
    }

    async fn status(&self, handle: &str) -> Result<BatchStatus, BatchError> {
        match self.statuses.lock().unwrap().get(handle) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(message)) => Err(BatchError::Status(message.clone())),
            None => Ok(BatchStatus::in_progress(BatchState::Running)),
        }
    }
}

pub fn text(raw: &str) -> BatchItemResult {
    BatchItemResult::Text(raw.to_string())
}
