//! LLM batch metadata backfill.
//!
//! The supervisor's loop picks eligible papers in chunks, the submitter turns
//! each chunk into one batch request, and a single shared poller resolves
//! finished jobs and fills in the missing fields. Every piece of job state
//! lives in the `batch_jobs` table, so a restarted process picks up where
//! the previous one stopped.

pub mod client;
pub mod eligibility;
mod error;
pub mod gemini;
pub mod poller;
pub mod submitter;
pub mod supervisor;

pub use client::{BatchClient, BatchItemResult, BatchRequest, BatchState, BatchStatus};
pub use eligibility::{eligible, is_eligible};
pub use error::BatchError;
pub use gemini::GeminiBatchClient;
pub use poller::{PollOutcome, Poller};
pub use submitter::ChunkSubmitter;
pub use supervisor::{LoopStatus, MetadataSupervisor};
