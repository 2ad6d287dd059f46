pub mod pdf;
pub mod worker;

pub use pdf::PdfInfo;
pub use worker::ExtractionWorker;
