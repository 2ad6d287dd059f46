use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::note_repo::NoteRow;
use crate::db::paper_repo::{PaperRow, PaperSort};
use crate::db::DatabaseError;

/// Shown wherever a paper has no title yet.
pub const UNTITLED: &str = "Untitled";

/// A catalog entry with typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: String,
    pub arxiv_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub published_date: Option<NaiveDate>,
    pub abstract_text: Option<String>,
    pub submission_url: String,
    pub file_id: String,
    pub view_url: String,
    pub metadata_skip_reason: Option<String>,
    pub added_at: String,
}

impl Paper {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
    }
}

impl TryFrom<PaperRow> for Paper {
    type Error = DatabaseError;

    fn try_from(row: PaperRow) -> Result<Self, Self::Error> {
        let published_date = row
            .published_date
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| DatabaseError::CorruptColumn {
                column: "published_date",
                reason: e.to_string(),
            })?;

        Ok(Self {
            id: row.id,
            arxiv_id: row.arxiv_id,
            title: row.title,
            authors: row.authors,
            published_date,
            abstract_text: row.abstract_text,
            submission_url: row.submission_url,
            file_id: row.file_id,
            view_url: row.view_url,
            metadata_skip_reason: row.metadata_skip_reason,
            added_at: row.added_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub content: String,
    pub updated_at: String,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Self {
            content: row.content,
            updated_at: row.updated_at,
        }
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperSummary {
    pub id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<NaiveDate>,
    pub added_at: String,
}

impl From<&Paper> for PaperSummary {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            arxiv_id: paper.arxiv_id.clone(),
            title: paper.display_title().to_string(),
            authors: paper.authors.clone(),
            published_date: paper.published_date,
            added_at: paper.added_at.clone(),
        }
    }
}

/// A paper with its note and tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperDetail {
    pub id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: Option<NaiveDate>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub submission_url: String,
    pub view_url: String,
    pub metadata_skip_reason: Option<String>,
    pub added_at: String,
    pub tags: Vec<String>,
    pub note: Note,
}

impl PaperDetail {
    pub fn new(paper: Paper, note: Note, tags: Vec<String>) -> Self {
        Self {
            title: paper.display_title().to_string(),
            id: paper.id,
            arxiv_id: paper.arxiv_id,
            authors: paper.authors,
            published_date: paper.published_date,
            abstract_text: paper.abstract_text,
            submission_url: paper.submission_url,
            view_url: paper.view_url,
            metadata_skip_reason: paper.metadata_skip_reason,
            added_at: paper.added_at,
            tags,
            note,
        }
    }
}

/// User edit of a paper. Metadata fields overwrite; `tags: None` leaves
/// the tag set alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Any layout `normalize_date` accepts.
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub sort: PaperSort,
    /// 1-based.
    #[serde(default = "default_page")]
    pub page: u64,
}

fn default_page() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperPage {
    pub papers: Vec<PaperSummary>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::paper_repo::tests::{complete_paper, sample_paper};

    #[test]
    fn test_paper_from_row() {
        let paper = Paper::try_from(complete_paper("p1")).unwrap();
        assert_eq!(paper.published_date, NaiveDate::from_ymd_opt(2020, 1, 1));

        let mut row = sample_paper("p2");
        row.published_date = Some("01/02/2020".to_string());
        assert!(matches!(
            Paper::try_from(row),
            Err(DatabaseError::CorruptColumn { column: "published_date", .. })
        ));
    }

    #[test]
    fn test_display_title_falls_back() {
        let mut paper = Paper::try_from(sample_paper("p1")).unwrap();
        assert_eq!(paper.display_title(), "Paper p1");
        paper.title = Some("  ".to_string());
        assert_eq!(paper.display_title(), UNTITLED);
        paper.title = None;
        assert_eq!(PaperSummary::from(&paper).title, UNTITLED);
    }

    #[test]
    fn test_detail_serializes_abstract_key() {
        let paper = Paper::try_from(complete_paper("p1")).unwrap();
        let detail = PaperDetail::new(
            paper,
            Note {
                content: String::new(),
                updated_at: "t".to_string(),
            },
            vec!["ml".to_string()],
        );
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["abstract"], "We study things.");
        assert_eq!(json["published_date"], "2020-01-01");
        assert_eq!(json["tags"][0], "ml");
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.sort, PaperSort::AddedAt);
        let query: ListQuery = serde_json::from_str(r#"{"sort":"title","page":3}"#).unwrap();
        assert_eq!(query.sort, PaperSort::Title);
        assert_eq!(query.page, 3);
    }
}
