//! Pipeline step handlers and the in-process orchestrator that runs them

mod cancel;
pub mod extraction;
pub mod handler;
pub mod orchestrator;
pub mod prompt;
pub mod summarization;
pub mod tagging;

pub use cancel::CancelToken;
pub use extraction::ExtractionHandler;
pub use handler::{ReturnType, StepHandler};
pub use orchestrator::{InProcessOrchestrator, OrchestratorServices, PipelineBuilder, PIPELINE_STATUS_FILE};
pub use summarization::SummarizationHandler;
pub use tagging::TaggingHandler;

/// Step names used to register and sequence handlers
pub mod steps {
    /// Text extraction, including OCR of PDFs
    pub const DOCUMENT_INTELLIGENCE: &str = "document-intelligence";
    pub const TEXT_PARTITIONER: &str = "text-partitioner";
    pub const GENERATE_EMBEDDING: &str = "generate-embedding";
    pub const SAVE_RECORD: &str = "save-record";
    pub const SUMMARIZE: &str = "summarize";
    pub const GENERATE_TAGS: &str = "generate-tags";
}
