//! Catalog operations behind the paper, note and tag routes.

pub mod model;

use std::sync::Arc;

use crate::db::paper_repo::{self, MetadataEdit, PaperQuery};
use crate::db::{note_repo, now_timestamp, tag_repo, Database};
use crate::error::LibraryError;
use crate::metadata::normalize_date;
use crate::storage::ObjectStore;

pub use model::{ListQuery, Note, Paper, PaperDetail, PaperPage, PaperSummary, PaperUpdate};

/// Papers per listing page.
pub const PAGE_SIZE: u64 = 50;

pub struct Library {
    db: Database,
    store: Arc<dyn ObjectStore>,
}

impl Library {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    fn find(&self, id: &str) -> Result<Paper, LibraryError> {
        let row = paper_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;
        Ok(Paper::try_from(row)?)
    }

    pub fn get(&self, id: &str) -> Result<PaperDetail, LibraryError> {
        let paper = self.find(id)?;
        let note = match note_repo::find(&self.db, id)? {
            Some(row) => Note::from(row),
            None => Note {
                content: String::new(),
                updated_at: paper.added_at.clone(),
            },
        };
        let tags = tag_repo::for_paper(&self.db, id)?;
        Ok(PaperDetail::new(paper, note, tags))
    }

    pub fn list(&self, query: &ListQuery) -> Result<PaperPage, LibraryError> {
        let page = query.page.max(1);
        let (rows, total) = paper_repo::search(
            &self.db,
            &PaperQuery {
                text: query.q.clone(),
                sort: query.sort,
                limit: Some(PAGE_SIZE),
                offset: Some((page - 1) * PAGE_SIZE),
            },
        )?;

        let papers = rows
            .into_iter()
            .map(|row| Paper::try_from(row).map(|p| PaperSummary::from(&p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaperPage { papers, total })
    }

    /// Overwrites the editable metadata. Blank strings clear a field.
    pub fn update(&self, id: &str, update: PaperUpdate) -> Result<PaperDetail, LibraryError> {
        let published_date = match non_blank(update.published_date) {
            Some(raw) => Some(
                normalize_date(&raw)
                    .map_err(|_| LibraryError::InvalidDate(raw.clone()))?
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
            None => None,
        };

        let edit = MetadataEdit {
            title: non_blank(update.title),
            authors: update
                .authors
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            published_date,
            abstract_text: non_blank(update.abstract_text),
        };

        if !paper_repo::update_metadata(&self.db, id, &edit)? {
            return Err(LibraryError::NotFound(id.to_string()));
        }
        if let Some(tags) = &update.tags {
            tag_repo::set_for_paper(&self.db, id, tags)?;
        }
        tracing::info!(paper_id = id, "Updated paper metadata");
        self.get(id)
    }

    /// Removes the paper, then deletes its stored file. A failed file
    /// delete is logged and ignored.
    pub async fn delete(&self, id: &str) -> Result<(), LibraryError> {
        let paper = self.find(id)?;
        if !paper_repo::delete(&self.db, id)? {
            return Err(LibraryError::NotFound(id.to_string()));
        }
        tag_repo::delete_unused(&self.db)?;
        tracing::info!(paper_id = id, "Deleted paper");

        if let Err(e) = self.store.delete(&paper.file_id).await {
            tracing::warn!(paper_id = id, file_id = %paper.file_id, error = %e, "Failed to delete stored file");
        }
        Ok(())
    }

    pub fn update_note(&self, id: &str, content: &str) -> Result<Note, LibraryError> {
        note_repo::upsert(&self.db, id, content, &now_timestamp())?
            .map(Note::from)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))
    }

    pub fn list_tags(&self) -> Result<Vec<String>, LibraryError> {
        Ok(tag_repo::list_by_usage(&self.db)?)
    }

    /// Viewable URL of the paper's PDF.
    pub fn pdf_url(&self, id: &str) -> Result<String, LibraryError> {
        Ok(self.find(id)?.view_url)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
