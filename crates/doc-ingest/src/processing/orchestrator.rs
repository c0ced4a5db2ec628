//! In-process pipeline orchestrator
//!
//! Runs the steps of a [`DataPipeline`] one after another against a
//! [`DocumentStore`], persisting the pipeline state after every step so a
//! later run resumes with the first step that did not succeed.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{ReturnType, StepHandler};
use super::CancelToken;
use crate::error::{Error, Result};
use crate::providers::{DocumentStore, PipelineOrchestrator, TextGenerator};
use crate::types::{DataPipeline, TagCollection};

/// Serialized pipeline state, stored next to the document's artifacts
pub const PIPELINE_STATUS_FILE: &str = "__pipeline_status.json";

/// Storage and generation capabilities shared by every handler
pub struct OrchestratorServices {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
}

impl OrchestratorServices {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

#[async_trait]
impl PipelineOrchestrator for OrchestratorServices {
    async fn read_file(&self, pipeline: &DataPipeline, file_name: &str, cancel: &CancelToken) -> Result<Bytes> {
        cancel
            .run(self.store.read_file(&pipeline.index, &pipeline.document_id, file_name))
            .await
    }

    async fn write_file(
        &self,
        pipeline: &DataPipeline,
        file_name: &str,
        data: Bytes,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel
            .run(self.store.write_file(&pipeline.index, &pipeline.document_id, file_name, data))
            .await
    }

    fn text_generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }
}

/// Collects what a new document run needs before the pipeline is created
pub struct PipelineBuilder {
    index: String,
    document_id: String,
    tags: TagCollection,
    steps: Vec<String>,
    uploads: Vec<(String, String, Bytes)>,
}

impl PipelineBuilder {
    /// Attach a source file; its MIME type is detected from the name
    pub fn add_upload_file(mut self, file_id: impl Into<String>, name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.uploads.push((file_id.into(), name.into(), bytes.into()));
        self
    }

    /// Append a step
    pub fn then(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn build(self) -> DataPipeline {
        let mut pipeline = DataPipeline::new(self.index, self.document_id, self.tags, self.steps);
        for (file_id, name, bytes) in self.uploads {
            pipeline.add_upload_file(file_id, name, bytes);
        }
        pipeline
    }
}

/// Runs pipelines in the calling task, one step at a time
pub struct InProcessOrchestrator {
    services: Arc<OrchestratorServices>,
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl InProcessOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            services: Arc::new(OrchestratorServices::new(store, generator)),
            handlers: HashMap::new(),
        }
    }

    /// Capabilities to hand to handlers
    pub fn services(&self) -> Arc<dyn PipelineOrchestrator> {
        self.services.clone()
    }

    /// Register a handler under its step name, replacing any previous one
    pub fn add_handler(&mut self, handler: Arc<dyn StepHandler>) {
        tracing::debug!("Registering handler for step '{}'", handler.step_name());
        self.handlers.insert(handler.step_name().to_string(), handler);
    }

    pub fn prepare_new_document_upload(
        &self,
        index: impl Into<String>,
        document_id: impl Into<String>,
        tags: TagCollection,
    ) -> PipelineBuilder {
        PipelineBuilder {
            index: index.into(),
            document_id: document_id.into(),
            tags,
            steps: Vec::new(),
            uploads: Vec::new(),
        }
    }

    /// Upload pending source files, then run the remaining steps in order.
    ///
    /// A step moves to the completed list only on `Success`; any other
    /// result stops the run and is returned with the step still pending.
    pub async fn run_pipeline(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> Result<ReturnType> {
        if let Some(missing) = pipeline
            .remaining_steps()
            .iter()
            .find(|step| !self.handlers.contains_key(step.as_str()))
        {
            return Err(Error::HandlerNotFound(missing.clone()));
        }

        match self.upload_files(pipeline, cancel).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                tracing::warn!(
                    "Pipeline {}/{} cancelled with {} upload(s) pending",
                    pipeline.index,
                    pipeline.document_id,
                    pipeline.pending_uploads()
                );
                return Ok(ReturnType::TransientFailure);
            }
            Err(e) => return Err(e),
        }
        self.save_status(pipeline).await?;

        tracing::info!(
            "Running pipeline {}/{}: {}",
            pipeline.index,
            pipeline.document_id,
            pipeline.remaining_steps().join(" -> ")
        );

        while let Some(step) = pipeline.remaining_steps().first().cloned() {
            if cancel.is_cancelled() {
                tracing::warn!("[{}] Pipeline {} cancelled before step", step, pipeline.document_id);
                return Ok(ReturnType::TransientFailure);
            }

            let handler = self
                .handlers
                .get(&step)
                .cloned()
                .ok_or_else(|| Error::HandlerNotFound(step.clone()))?;

            tracing::info!("[{}] Starting step for {}/{}", step, pipeline.index, pipeline.document_id);
            let result = handler.invoke(pipeline, cancel).await;

            if result == ReturnType::Success {
                pipeline.complete_current_step();
                self.save_status(pipeline).await?;
                tracing::info!("[{}] Step completed", step);
            } else {
                pipeline.touch();
                self.save_status(pipeline).await?;
                tracing::warn!("[{}] Step returned {:?}, stopping pipeline", step, result);
                return Ok(result);
            }
        }

        tracing::info!("Pipeline {}/{} complete", pipeline.index, pipeline.document_id);
        Ok(ReturnType::Success)
    }

    /// Load the state saved by the last run of a document, if any
    pub async fn read_pipeline_status(&self, index: &str, document_id: &str) -> Result<Option<DataPipeline>> {
        match self.services.store.read_file(index, document_id, PIPELINE_STATUS_FILE).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(Error::FileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write pending source bytes one file at a time. A file that could not
    /// be written stays queued with everything after it.
    async fn upload_files(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> Result<()> {
        while let Some(upload) = pipeline.next_file_to_upload() {
            let written = cancel
                .run(self.services.store.write_file(
                    &pipeline.index,
                    &pipeline.document_id,
                    &upload.name,
                    upload.bytes.clone(),
                ))
                .await;

            if let Err(e) = written {
                pipeline.requeue_upload(upload);
                return Err(e);
            }
            tracing::info!(
                "Uploaded {} ({} bytes) as file {}",
                upload.name,
                upload.bytes.len(),
                upload.file_id
            );
        }
        Ok(())
    }

    /// Saved without the cancel token so marks committed so far are kept
    async fn save_status(&self, pipeline: &DataPipeline) -> Result<()> {
        let data = serde_json::to_vec_pretty(pipeline)?;
        self.services
            .store
            .write_file(&pipeline.index, &pipeline.document_id, PIPELINE_STATUS_FILE, Bytes::from(data))
            .await
    }
}
