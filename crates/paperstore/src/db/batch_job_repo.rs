//! Batch job repository — persisted lifecycle of LLM batch submissions.
//!
//! A job row is written once the batch service has accepted a chunk and is
//! closed exactly once, to `applied` or `failed`. Rows are never deleted.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobState {
    Submitted,
    Applied,
    Failed,
}

impl BatchJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobState::Submitted => "submitted",
            BatchJobState::Applied => "applied",
            BatchJobState::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchJobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(BatchJobState::Submitted),
            "applied" => Ok(BatchJobState::Applied),
            "failed" => Ok(BatchJobState::Failed),
            other => Err(format!("unknown batch job state '{}'", other)),
        }
    }
}

/// A persisted batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJobRow {
    pub id: String,
    /// Handle assigned by the batch service.
    pub external_name: String,
    pub state: BatchJobState,
    /// Paper ids in request order; result *i* belongs to member *i*.
    pub member_ids: Vec<String>,
    pub papers_done: u64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl BatchJobRow {
    /// A fresh job in state `submitted`.
    pub fn submitted(external_name: &str, member_ids: Vec<String>, created_at: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_name: external_name.to_string(),
            state: BatchJobState::Submitted,
            member_ids,
            papers_done: 0,
            created_at: created_at.to_string(),
            completed_at: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let state: String = row.get("state")?;
        let state = state.parse::<BatchJobState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;
        let members: String = row.get("member_ids")?;
        let member_ids: Vec<String> = serde_json::from_str(&members)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Self {
            id: row.get("id")?,
            external_name: row.get("external_name")?,
            state,
            member_ids,
            papers_done: row.get("papers_done")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

pub fn insert(db: &Database, job: &BatchJobRow) -> Result<(), DatabaseError> {
    let members = serde_json::to_string(&job.member_ids).map_err(|e| {
        DatabaseError::CorruptColumn {
            column: "member_ids",
            reason: e.to_string(),
        }
    })?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO batch_jobs (id, external_name, state, member_ids, papers_done,
             created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id,
                job.external_name,
                job.state.as_str(),
                members,
                job.papers_done as i64,
                job.created_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<BatchJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM batch_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], BatchJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All jobs in the given state, oldest first.
pub fn list_by_state(
    db: &Database,
    state: BatchJobState,
) -> Result<Vec<BatchJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM batch_jobs WHERE state = ?1 ORDER BY created_at, id")?;
        let rows = stmt
            .query_map(params![state.as_str()], BatchJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_by_state(db: &Database, state: BatchJobState) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM batch_jobs WHERE state = ?1",
            params![state.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Closes a `submitted` job as `applied`. Returns false if the job was
/// already closed (or does not exist).
pub fn mark_applied(
    db: &Database,
    id: &str,
    papers_done: u64,
    completed_at: &str,
) -> Result<bool, DatabaseError> {
    close(db, id, BatchJobState::Applied, papers_done, completed_at)
}

/// Closes a `submitted` job as `failed` with zero papers applied.
pub fn mark_failed(db: &Database, id: &str, completed_at: &str) -> Result<bool, DatabaseError> {
    close(db, id, BatchJobState::Failed, 0, completed_at)
}

fn close(
    db: &Database,
    id: &str,
    state: BatchJobState,
    papers_done: u64,
    completed_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE batch_jobs SET state = ?2, papers_done = ?3, completed_at = ?4
             WHERE id = ?1 AND state = 'submitted'",
            params![id, state.as_str(), papers_done as i64, completed_at],
        )?;
        Ok(changed > 0)
    })
}
