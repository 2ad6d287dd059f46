//! Shared utilities for paperstore integration tests.
//!
//! - `TestHarness`: a file-backed database in a temp directory, an
//!   in-memory object store, one extraction worker and a scripted batch
//!   client
//! - `build_pdf`: tiny text PDFs built with lopdf

pub mod fakes;
pub mod harness;
pub mod pdf;

pub use fakes::{text, FakeBatchClient, MemoryStore};
pub use harness::TestHarness;
pub use pdf::build_pdf;
