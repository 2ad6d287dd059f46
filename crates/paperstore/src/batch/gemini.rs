//! Gemini Batch API client (inline requests, inline responses).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::client::{BatchClient, BatchItemResult, BatchRequest, BatchState, BatchStatus};
use super::BatchError;
use crate::config::GeminiConfig;
use crate::sanitize::truncate_body;

const DISPLAY_NAME: &str = "paperstore-metadata-chunk";

pub struct GeminiBatchClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiBatchClient {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Result<Self, BatchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| BatchError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.trim_start_matches("models/").to_string(),
            api_key,
        })
    }

    /// Builds a client from config. A missing key or model is a
    /// configuration error.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, BatchError> {
        let api_key = config
            .resolve_api_key()
            .map_err(|e| BatchError::Config(e.to_string()))?
            .ok_or_else(|| BatchError::Config("Gemini API key is not set".to_string()))?;
        let model = config
            .resolve_model()
            .ok_or_else(|| BatchError::Config("Gemini model is not set".to_string()))?;
        Self::new(&config.base_url, api_key, &model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BatchClient for GeminiBatchClient {
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, BatchError> {
        let inline: Vec<_> = requests
            .iter()
            .map(|r| {
                json!({
                    "request": {
                        "contents": [{ "parts": [{ "text": r.prompt }], "role": "user" }]
                    },
                    "metadata": { "key": r.paper_id }
                })
            })
            .collect();
        let body = json!({
            "batch": {
                "display_name": DISPLAY_NAME,
                "input_config": { "requests": { "requests": inline } }
            }
        });

        let url = format!("{}/models/{}:batchGenerateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| BatchError::Submit(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BatchError::Submit(e.to_string()))?;
        if !status.is_success() {
            return Err(BatchError::Submit(format!(
                "Gemini returned {}: {}",
                status,
                truncate_body(&text)
            )));
        }

        let operation: Operation = serde_json::from_str(&text)
            .map_err(|e| BatchError::Submit(format!("Unexpected response: {}", e)))?;
        let name = operation
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BatchError::Submit("Response carried no batch name".to_string()))?;

        tracing::info!(batch = %name, requests = requests.len(), "Submitted Gemini batch");
        Ok(name)
    }

    async fn status(&self, handle: &str) -> Result<BatchStatus, BatchError> {
        let url = format!("{}/{}", self.base_url, handle.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| BatchError::Status(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BatchError::Status(e.to_string()))?;
        if !status.is_success() {
            return Err(BatchError::Status(format!(
                "Gemini returned {} for {}: {}",
                status,
                handle,
                truncate_body(&text)
            )));
        }

        let operation: Operation = serde_json::from_str(&text)
            .map_err(|e| BatchError::Status(format!("Unexpected response: {}", e)))?;
        Ok(operation.into_status())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    metadata: Option<BatchMetadata>,
    response: Option<BatchOutput>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchMetadata {
    state: Option<String>,
    output: Option<BatchOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchOutput {
    inlined_responses: Option<InlinedResponses>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlinedResponses {
    #[serde(default)]
    inlined_responses: Vec<InlinedResponse>,
}

#[derive(Debug, Deserialize)]
struct InlinedResponse {
    response: Option<GenerateContentResponse>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: Option<i64>,
    message: Option<String>,
}

impl ApiStatus {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => format!("error code {}", code),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl Operation {
    fn into_status(self) -> BatchStatus {
        let state = map_state(
            self.metadata.as_ref().and_then(|m| m.state.as_deref()),
            self.done,
            self.error.is_some(),
        );
        if !state.is_success() {
            return BatchStatus::in_progress(state);
        }

        let output = self
            .response
            .or_else(|| self.metadata.and_then(|m| m.output))
            .and_then(|o| o.inlined_responses)
            .map(|r| r.inlined_responses)
            .unwrap_or_default();
        let results = output.into_iter().map(InlinedResponse::into_result).collect();

        BatchStatus {
            state,
            results: Some(results),
        }
    }
}

impl InlinedResponse {
    fn into_result(self) -> BatchItemResult {
        if let Some(error) = self.error {
            return BatchItemResult::Error(error.describe());
        }
        let text = self
            .response
            .and_then(|r| r.candidates.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        BatchItemResult::Text(text)
    }
}

/// Maps a Gemini batch state name. Both the `BATCH_STATE_` and `JOB_STATE_`
/// spellings occur. A partial success counts as failed.
fn map_state(raw: Option<&str>, done: bool, has_error: bool) -> BatchState {
    let Some(raw) = raw else {
        return match (done, has_error) {
            (true, true) => BatchState::Failed,
            (true, false) => BatchState::Succeeded,
            (false, _) => BatchState::Pending,
        };
    };
    let name = raw
        .strip_prefix("BATCH_STATE_")
        .or_else(|| raw.strip_prefix("JOB_STATE_"))
        .unwrap_or(raw);

    match name {
        "PENDING" | "QUEUED" | "UNSPECIFIED" => BatchState::Pending,
        "RUNNING" | "UPDATING" | "PAUSED" => BatchState::Running,
        "SUCCEEDED" => BatchState::Succeeded,
        "PARTIALLY_SUCCEEDED" | "FAILED" => BatchState::Failed,
        "CANCELLED" | "CANCELLING" => BatchState::Cancelled,
        "EXPIRED" => BatchState::Expired,
        other => {
            tracing::warn!(state = other, done, "Unknown Gemini batch state");
            if done {
                BatchState::Failed
            } else {
                BatchState::Pending
            }
        }
    }
}
