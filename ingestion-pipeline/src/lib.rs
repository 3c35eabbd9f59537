#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunking;
pub mod extraction;
pub mod pipeline;
pub mod progress;
pub mod text_cleaning;
pub mod utils;

pub use pipeline::{IngestRequest, IngestionPipeline, IngestionTuning};
