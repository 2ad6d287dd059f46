//! Paper repository — CRUD, search and metadata-fill operations for the
//! `papers` table.

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Deserialize;

use super::{Database, DatabaseError};

/// Missing-metadata predicate; mirrors `batch::eligibility::is_eligible`.
const ELIGIBLE_CONDITION: &str = "metadata_skip_reason IS NULL AND (
        abstract IS NULL
        OR trim(abstract, ' ' || char(9) || char(10) || char(13)) = ''
        OR authors = '[]'
        OR published_date IS NULL
    )";

const SELECT_COLUMNS: &str = "id, arxiv_id, title, authors, published_date, abstract,
     submission_url, file_id, view_url, metadata_skip_reason, added_at";

/// A raw paper row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRow {
    pub id: String,
    pub arxiv_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD`.
    pub published_date: Option<String>,
    pub abstract_text: Option<String>,
    pub submission_url: String,
    pub file_id: String,
    pub view_url: String,
    pub metadata_skip_reason: Option<String>,
    pub added_at: String,
}

impl PaperRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let authors_json: String = row.get("authors")?;
        let authors: Vec<String> = serde_json::from_str(&authors_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Self {
            id: row.get("id")?,
            arxiv_id: row.get("arxiv_id")?,
            title: row.get("title")?,
            authors,
            published_date: row.get("published_date")?,
            abstract_text: row.get("abstract")?,
            submission_url: row.get("submission_url")?,
            file_id: row.get("file_id")?,
            view_url: row.get("view_url")?,
            metadata_skip_reason: row.get("metadata_skip_reason")?,
            added_at: row.get("added_at")?,
        })
    }
}

/// Sort order for listings without a text query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSort {
    #[default]
    AddedAt,
    Title,
}

#[derive(Debug, Clone, Default)]
pub struct PaperQuery {
    /// Free-text query; blank means "everything".
    pub text: Option<String>,
    pub sort: PaperSort,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A full overwrite of the user-editable metadata fields.
#[derive(Debug, Clone, Default)]
pub struct MetadataEdit {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub abstract_text: Option<String>,
}

/// Candidate values for fields that are currently empty. `None` leaves the
/// column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFill {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub published_date: Option<String>,
    pub abstract_text: Option<String>,
}

impl MetadataFill {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_none()
            && self.published_date.is_none()
            && self.abstract_text.is_none()
    }
}

/// Blank text is stored as NULL, so the SQL predicates only need `IS NULL`
/// to agree with `str::trim` on every kind of Unicode whitespace.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn authors_json(authors: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(authors).map_err(|e| DatabaseError::CorruptColumn {
        column: "authors",
        reason: e.to_string(),
    })
}

fn insert_conn(conn: &Connection, paper: &PaperRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO papers (id, arxiv_id, title, authors, published_date, abstract,
         submission_url, file_id, view_url, metadata_skip_reason, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            paper.id,
            paper.arxiv_id,
            non_blank(paper.title.as_deref()),
            authors_json(&paper.authors)?,
            paper.published_date,
            non_blank(paper.abstract_text.as_deref()),
            paper.submission_url,
            paper.file_id,
            paper.view_url,
            paper.metadata_skip_reason,
            paper.added_at,
        ],
    )?;
    Ok(())
}

/// Inserts a paper row.
pub fn insert(db: &Database, paper: &PaperRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_conn(conn, paper))
}

/// Inserts a paper together with its empty note in one transaction.
pub fn insert_with_note(db: &Database, paper: &PaperRow) -> Result<(), DatabaseError> {
    db.with_transaction(|conn| {
        insert_conn(conn, paper)?;
        conn.execute(
            "INSERT INTO notes (paper_id, content, updated_at) VALUES (?1, '', ?2)",
            params![paper.id, paper.added_at],
        )?;
        Ok(())
    })
}

fn find_one(
    db: &Database,
    column: &'static str,
    value: &str,
) -> Result<Option<PaperRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM papers WHERE {} = ?1", SELECT_COLUMNS, column);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![value], PaperRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<PaperRow>, DatabaseError> {
    find_one(db, "id", id)
}

pub fn find_by_submission_url(
    db: &Database,
    url: &str,
) -> Result<Option<PaperRow>, DatabaseError> {
    find_one(db, "submission_url", url)
}

pub fn find_by_arxiv_id(db: &Database, arxiv_id: &str) -> Result<Option<PaperRow>, DatabaseError> {
    find_one(db, "arxiv_id", arxiv_id)
}

/// Returns every paper, oldest first.
pub fn list_all(db: &Database) -> Result<Vec<PaperRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM papers ORDER BY added_at, id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], PaperRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Turns free text into an FTS5 expression: every whitespace token quoted,
/// implicitly AND-ed. Returns `None` for blank input.
fn fts_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Lists papers, returning (rows, total_count).
///
/// With a text query results are ranked by relevance; otherwise they follow
/// `query.sort`.
pub fn search(db: &Database, query: &PaperQuery) -> Result<(Vec<PaperRow>, u64), DatabaseError> {
    let limit = query.limit.unwrap_or(50) as i64;
    let offset = query.offset.unwrap_or(0) as i64;
    let expression = query.text.as_deref().and_then(fts_expression);

    db.with_conn(|conn| match expression {
        Some(ref expr) => {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM papers_fts WHERE papers_fts MATCH ?1",
                params![expr],
                |r| r.get(0),
            )?;
            let sql = format!(
                "SELECT {} FROM papers_fts JOIN papers ON papers.id = papers_fts.paper_id
                 WHERE papers_fts MATCH ?1
                 ORDER BY bm25(papers_fts), papers.added_at DESC
                 LIMIT ?2 OFFSET ?3",
                prefixed_columns()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![expr, limit, offset], PaperRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total))
        }
        None => {
            let total: u64 = conn.query_row("SELECT COUNT(*) FROM papers", [], |r| r.get(0))?;
            let order = match query.sort {
                PaperSort::AddedAt => "added_at DESC, id",
                PaperSort::Title => "title IS NULL, title COLLATE NOCASE, added_at DESC",
            };
            let sql = format!(
                "SELECT {} FROM papers ORDER BY {} LIMIT ?1 OFFSET ?2",
                SELECT_COLUMNS, order
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], PaperRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total))
        }
    })
}

fn prefixed_columns() -> String {
    SELECT_COLUMNS
        .split(',')
        .map(|c| format!("papers.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Overwrites the editable metadata. Returns false if the paper is missing.
pub fn update_metadata(
    db: &Database,
    id: &str,
    edit: &MetadataEdit,
) -> Result<bool, DatabaseError> {
    let authors = authors_json(&edit.authors)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE papers SET title = ?2, authors = ?3, published_date = ?4, abstract = ?5
             WHERE id = ?1",
            params![
                id,
                non_blank(edit.title.as_deref()),
                authors,
                edit.published_date,
                non_blank(edit.abstract_text.as_deref())
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Writes each candidate value only where the column is currently empty.
///
/// The emptiness checks run inside the UPDATE itself, so a concurrent edit
/// is never overwritten. Returns false if the paper is missing.
pub fn fill_missing(db: &Database, id: &str, fill: &MetadataFill) -> Result<bool, DatabaseError> {
    let authors = fill.authors.as_deref().map(authors_json).transpose()?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE papers SET
               title = CASE
                 WHEN (title IS NULL OR trim(title) = '') AND ?2 IS NOT NULL THEN ?2
                 ELSE title END,
               authors = CASE
                 WHEN authors = '[]' AND ?3 IS NOT NULL THEN ?3
                 ELSE authors END,
               published_date = COALESCE(published_date, ?4),
               abstract = CASE
                 WHEN (abstract IS NULL
                       OR trim(abstract, ' ' || char(9) || char(10) || char(13)) = '')
                      AND ?5 IS NOT NULL THEN ?5
                 ELSE abstract END
             WHERE id = ?1",
            params![
                id,
                non_blank(fill.title.as_deref()),
                authors,
                fill.published_date,
                non_blank(fill.abstract_text.as_deref())
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Records why metadata extraction cannot run for a paper. An existing
/// reason is never replaced. Returns true if the reason was written.
pub fn set_skip_reason(db: &Database, id: &str, reason: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE papers SET metadata_skip_reason = ?2
             WHERE id = ?1 AND metadata_skip_reason IS NULL",
            params![id, reason],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes a paper; its note and tag links cascade.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM papers WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Counts papers that are missing metadata and have no skip reason.
pub fn count_eligible(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT COUNT(*) FROM papers WHERE {}", ELIGIBLE_CONDITION);
        let count: u64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Selects up to `limit` eligible paper ids, oldest first.
///
/// Papers that belong to a job still in state `submitted` and the ids in
/// `exclude` are left out.
pub fn list_eligible_ids(
    db: &Database,
    limit: usize,
    exclude: &[String],
) -> Result<Vec<String>, DatabaseError> {
    let exclude_json = serde_json::to_string(exclude).map_err(|e| DatabaseError::CorruptColumn {
        column: "id",
        reason: e.to_string(),
    })?;
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT id FROM papers
             WHERE {}
               AND id NOT IN (SELECT value FROM json_each(?1))
               AND id NOT IN (
                 SELECT member.value FROM batch_jobs, json_each(batch_jobs.member_ids) AS member
                 WHERE batch_jobs.state = 'submitted'
               )
             ORDER BY added_at, id
             LIMIT ?2",
            ELIGIBLE_CONDITION
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![exclude_json, limit as i64], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}
