//! Capabilities a pipeline handler receives from its orchestrator

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::llm::TextGenerator;
use crate::error::Result;
use crate::processing::CancelToken;
use crate::types::DataPipeline;

/// File I/O and text generation scoped to one pipeline. Handlers never touch
/// storage or a model except through this trait.
#[async_trait]
pub trait PipelineOrchestrator: Send + Sync {
    /// Read a file belonging to the pipeline's document
    async fn read_file(&self, pipeline: &DataPipeline, file_name: &str, cancel: &CancelToken) -> Result<Bytes>;

    /// Write a file next to the pipeline's document, replacing any previous content
    async fn write_file(
        &self,
        pipeline: &DataPipeline,
        file_name: &str,
        data: Bytes,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Text generator shared by the synthetic-data handlers
    fn text_generator(&self) -> Arc<dyn TextGenerator>;

    /// Read a file and decode it as UTF-8 (lossy)
    async fn read_text_file(&self, pipeline: &DataPipeline, file_name: &str, cancel: &CancelToken) -> Result<String> {
        let data = self.read_file(pipeline, file_name, cancel).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
