use async_trait::async_trait;
use serde::Serialize;

use super::BatchError;

/// One prompt in a batch, tagged with the paper it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub paper_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Pending | BatchState::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchState::Succeeded)
    }
}

/// Outcome of one request, in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItemResult {
    Text(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub state: BatchState,
    /// Present once the job has succeeded.
    pub results: Option<Vec<BatchItemResult>>,
}

impl BatchStatus {
    pub fn in_progress(state: BatchState) -> Self {
        Self {
            state,
            results: None,
        }
    }
}

/// An asynchronous LLM batch service.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Submits all requests as one job and returns the service's handle.
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, BatchError>;

    async fn status(&self, handle: &str) -> Result<BatchStatus, BatchError>;
}
