//! Note repository — one free-text note per paper.

use rusqlite::params;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub paper_id: String,
    pub content: String,
    pub updated_at: String,
}

/// Replaces the note content for a paper, creating the note if needed.
/// Returns `None` when the paper does not exist.
pub fn upsert(
    db: &Database,
    paper_id: &str,
    content: &str,
    updated_at: &str,
) -> Result<Option<NoteRow>, DatabaseError> {
    db.with_conn(|conn| {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM papers WHERE id = ?1)",
            params![paper_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Ok(None);
        }
        conn.execute(
            "INSERT INTO notes (paper_id, content, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(paper_id) DO UPDATE SET content = ?2, updated_at = ?3",
            params![paper_id, content, updated_at],
        )?;
        Ok(Some(NoteRow {
            paper_id: paper_id.to_string(),
            content: content.to_string(),
            updated_at: updated_at.to_string(),
        }))
    })
}

pub fn find(db: &Database, paper_id: &str) -> Result<Option<NoteRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT paper_id, content, updated_at FROM notes WHERE paper_id = ?1")?;
        let mut rows = stmt.query_map(params![paper_id], |row| {
            Ok(NoteRow {
                paper_id: row.get(0)?,
                content: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
