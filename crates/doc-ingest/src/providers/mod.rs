//! Provider abstractions for OCR, text generation, and document storage
//!
//! Each external capability sits behind a trait so handlers can run against
//! local (Ollama, filesystem) or cloud (Azure) backends, or against fakes.

pub mod azure_openai;
pub mod document_intelligence;
pub mod document_store;
pub mod llm;
pub mod local;
pub mod ocr;
pub mod ollama;
pub mod orchestrator;
pub mod stream;

pub use azure_openai::AzureOpenAiGenerator;
pub use document_intelligence::DocumentIntelligenceClient;
pub use document_store::DocumentStore;
pub use llm::{collect_tokens, TextGenerationOptions, TextGenerator, TokenStream};
pub use local::{LocalDocumentStore, MemoryDocumentStore};
pub use ocr::{analyze_to_completion, AnalyzedDocument, OcrOperation, OcrPolicy, OcrService, OcrStatus};
pub use ollama::OllamaGenerator;
pub use orchestrator::PipelineOrchestrator;

use std::sync::Arc;

use crate::config::{DocumentIntelligenceConfig, LlmBackend, LlmConfig};
use crate::error::Result;

/// Build the text generator selected by `llm.backend`
pub fn text_generator_from_config(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match config.backend {
        LlmBackend::Ollama => Arc::new(OllamaGenerator::new(config)?),
        LlmBackend::AzureOpenai => Arc::new(AzureOpenAiGenerator::new(config)?),
    };
    tracing::info!(
        "Text generation: {} (model: {})",
        generator.name(),
        generator.model()
    );
    Ok(generator)
}

/// Build the OCR client with its timing policy; `None` when no endpoint is configured
pub fn ocr_service_from_config(
    config: &DocumentIntelligenceConfig,
) -> Result<Option<(Arc<dyn OcrService>, OcrPolicy)>> {
    if !config.is_configured() {
        return Ok(None);
    }
    let client: Arc<dyn OcrService> = Arc::new(DocumentIntelligenceClient::new(config)?);
    let policy = OcrPolicy {
        poll_interval: config.poll_interval(),
        timeout: config.timeout(),
    };
    Ok(Some((client, policy)))
}
