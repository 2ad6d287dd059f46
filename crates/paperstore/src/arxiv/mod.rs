//! arXiv identifiers and the Atom metadata API.

pub mod client;
pub mod parser;

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::ArxivClient;

/// New-style ids such as `2301.00001`, version suffix dropped.
static RE_NEW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}\.\d{4,5})(?:v\d+)?").unwrap());

/// Legacy ids such as `hep-th/9901001`.
static RE_LEGACY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w-]+/\d{7})(?:v\d+)?").unwrap());

#[derive(Error, Debug)]
pub enum ArxivError {
    #[error("Cannot extract arXiv id from '{0}'")]
    InvalidId(String),

    #[error("arXiv paper not found: {0}")]
    NotFound(String),

    #[error("arXiv request failed: {0}")]
    Http(String),

    #[error("Invalid arXiv response: {0}")]
    Parse(String),
}

/// Catalog fields taken from an arXiv entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivMetadata {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<NaiveDate>,
    pub abstract_text: String,
}

/// Pulls a normalized arXiv id out of a URL or bare id string.
pub fn extract_arxiv_id(url_or_id: &str) -> Result<String, ArxivError> {
    [&*RE_NEW_ID, &*RE_LEGACY_ID]
        .iter()
        .find_map(|re| re.captures(url_or_id))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ArxivError::InvalidId(url_or_id.to_string()))
}

/// True for URLs on `arxiv.org` or any of its subdomains.
pub fn is_arxiv_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            host == "arxiv.org" || host == "ar5iv.labs.arxiv.org" || host.ends_with(".arxiv.org")
        }
        None => false,
    }
}
