use std::time::Duration;

use reqwest::Client;

use super::parser::parse_atom_response;
use super::{ArxivError, ArxivMetadata};
use crate::config::ArxivConfig;
use crate::sanitize::truncate_body;

/// Client for the arXiv Atom query API.
pub struct ArxivClient {
    client: Client,
    api_url: String,
    pdf_base_url: String,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self, ArxivError> {
        Self::with_urls(&config.api_url, &config.pdf_base_url)
    }

    pub fn with_urls(api_url: &str, pdf_base_url: &str) -> Result<Self, ArxivError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("paperstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArxivError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            pdf_base_url: pdf_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Metadata of one paper by normalized id.
    pub async fn fetch(&self, arxiv_id: &str) -> Result<ArxivMetadata, ArxivError> {
        tracing::debug!(arxiv_id, "Fetching arXiv metadata");

        let response = self
            .client
            .get(&self.api_url)
            .query(&[("id_list", arxiv_id), ("max_results", "1")])
            .send()
            .await
            .map_err(|e| ArxivError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArxivError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(ArxivError::Http(format!(
                "{} returned {}: {}",
                self.api_url,
                status,
                truncate_body(&body)
            )));
        }

        parse_atom_response(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| ArxivError::NotFound(arxiv_id.to_string()))
    }

    /// Direct PDF download URL for an id.
    pub fn pdf_url(&self, arxiv_id: &str) -> String {
        format!("{}/{}", self.pdf_base_url, arxiv_id)
    }
}
