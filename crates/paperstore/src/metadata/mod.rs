//! LLM metadata extraction: prompt text, response parsing and the
//! fill-empty-fields apply rule.

pub mod date;
pub mod prompt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::paper_repo::{self, MetadataFill};
use crate::db::{Database, DatabaseError};

pub use date::{normalize_date, DateParseError};
pub use prompt::{build_prompt, EXTRACTION_PROMPT};

/// Metadata recovered from one LLM response. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    /// Unnormalized date text as the model wrote it.
    pub date: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl ExtractedMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_empty()
            && self.date.is_none()
            && self.abstract_text.is_none()
    }

    /// Candidate column values. The date is dropped when it does not
    /// normalize.
    pub fn to_fill(&self) -> MetadataFill {
        let published_date = self.date.as_deref().and_then(|raw| match normalize_date(raw) {
            Ok(date) => Some(date.format("%Y-%m-%d").to_string()),
            Err(e) => {
                tracing::debug!(raw, error = %e, "Discarding unparseable extracted date");
                None
            }
        });

        MetadataFill {
            title: self.title.clone(),
            authors: (!self.authors.is_empty()).then(|| self.authors.clone()),
            published_date,
            abstract_text: self.abstract_text.clone(),
        }
    }
}

/// Parses a raw model response, best effort.
///
/// An optional surrounding code fence (with or without a `json` tag) is
/// stripped first. Malformed JSON or a non-object value yields an empty
/// record instead of an error.
pub fn parse_metadata(raw: &str) -> ExtractedMetadata {
    let body = strip_code_fence(raw);
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return ExtractedMetadata::default();
    };

    let authors = match map.get("authors") {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        _ => Vec::new(),
    };

    ExtractedMetadata {
        title: map.get("title").and_then(scalar_text),
        authors,
        date: map.get("date").and_then(scalar_text),
        abstract_text: map.get("abstract").and_then(scalar_text),
    }
}

/// Renders a JSON value as trimmed text; null and blank become `None`.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    rest.trim()
}

/// Applies extracted metadata to a paper, filling only empty fields.
///
/// Returns false if the paper no longer exists. Applying the same metadata
/// twice is a no-op the second time.
pub fn apply_to_paper(
    db: &Database,
    paper_id: &str,
    metadata: &ExtractedMetadata,
) -> Result<bool, DatabaseError> {
    paper_repo::fill_missing(db, paper_id, &metadata.to_fill())
}
