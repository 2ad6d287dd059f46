use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch extraction is not configured: {0}")]
    Config(String),

    #[error("Failed to submit batch: {0}")]
    Submit(String),

    #[error("Failed to query batch status: {0}")]
    Status(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
