use chrono::DateTime;
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{extract_arxiv_id, ArxivError, ArxivMetadata};

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

/// Parses an arXiv API Atom feed into catalog metadata, one item per entry.
pub fn parse_atom_response(xml: &str) -> Result<Vec<ArxivMetadata>, ArxivError> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| ArxivError::Parse(format!("invalid atom xml: {e}")))?;

    feed.entries.into_iter().map(parse_entry).collect()
}

fn parse_entry(entry: AtomEntry) -> Result<ArxivMetadata, ArxivError> {
    let arxiv_id = extract_arxiv_id(entry.id.trim())
        .map_err(|_| ArxivError::Parse(format!("invalid arXiv id in entry: {}", entry.id)))?;

    let published_date = entry
        .published
        .as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|dt| dt.date_naive());

    Ok(ArxivMetadata {
        arxiv_id,
        title: clean_text(&entry.title),
        authors: entry
            .authors
            .iter()
            .map(|author| clean_text(&author.name))
            .filter(|name| !name.is_empty())
            .collect(),
        published_date,
        abstract_text: clean_text(&entry.summary),
    })
}

/// Collapses the hard-wrapped whitespace the API puts in titles and
/// abstracts.
fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
