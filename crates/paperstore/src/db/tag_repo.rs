//! Tag repository — tag names and their links to papers.

use rusqlite::params;

use super::{Database, DatabaseError};

/// Replaces the tag set of a paper. Names are trimmed; blanks and
/// duplicates are dropped. Unused tags are garbage-collected.
pub fn set_for_paper(db: &Database, paper_id: &str, names: &[String]) -> Result<(), DatabaseError> {
    let mut cleaned: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    cleaned.sort_unstable();
    cleaned.dedup();

    db.with_transaction(|conn| {
        conn.execute(
            "DELETE FROM paper_tags WHERE paper_id = ?1",
            params![paper_id],
        )?;
        for name in &cleaned {
            conn.execute(
                "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![name],
            )?;
            conn.execute(
                "INSERT INTO paper_tags (paper_id, tag_id)
                 SELECT ?1, id FROM tags WHERE name = ?2",
                params![paper_id, name],
            )?;
        }
        conn.execute(
            "DELETE FROM tags WHERE id NOT IN (SELECT tag_id FROM paper_tags)",
            [],
        )?;
        Ok(())
    })
}

/// Removes tags no paper links to any more. Returns how many were removed.
pub fn delete_unused(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM tags WHERE id NOT IN (SELECT tag_id FROM paper_tags)",
            [],
        )?;
        Ok(removed)
    })
}

/// Tag names of one paper, alphabetically.
pub fn for_paper(db: &Database, paper_id: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tags.name FROM tags JOIN paper_tags ON paper_tags.tag_id = tags.id
             WHERE paper_tags.paper_id = ?1 ORDER BY tags.name",
        )?;
        let names = stmt
            .query_map(params![paper_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    })
}

/// All tag names ordered by usage count (descending), then name.
pub fn list_by_usage(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tags.name FROM tags
             LEFT JOIN paper_tags ON paper_tags.tag_id = tags.id
             GROUP BY tags.id
             ORDER BY COUNT(paper_tags.paper_id) DESC, tags.name ASC",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    })
}
