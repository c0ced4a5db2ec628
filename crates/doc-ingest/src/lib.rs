//! doc-ingest: document ingestion pipeline
//!
//! Uploaded documents (Word, PowerPoint, Excel, PDF, JSON and plain text) run
//! through a fixed sequence of named steps. Each step handler derives
//! artifacts from the source files (extracted text, summaries, tags) and
//! records its name on every file it finished, so re-running a pipeline
//! never processes the same file twice.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod types;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use processing::{
    steps, CancelToken, ExtractionHandler, InProcessOrchestrator, ReturnType, StepHandler, SummarizationHandler,
    TaggingHandler,
};
pub use types::{ArtifactType, DataPipeline, FileDetails, GeneratedFileDetails, TagCollection};
