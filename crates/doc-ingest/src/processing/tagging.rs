//! Tag generation step: classification tags merged into the pipeline tags

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::handler::{report_file_error, FileOutcome, ReturnType, StepHandler};
use super::prompt::{ContentPrompt, GeneratedText};
use super::{steps, CancelToken};
use crate::config::TaggingConfig;
use crate::error::Result;
use crate::ingestion::TokenCounter;
use crate::providers::{PipelineOrchestrator, TextGenerationOptions};
use crate::types::tags::SYNTHETIC_TAGS;
use crate::types::{mime, ArtifactType, DataPipeline, FileDetails, GeneratedFileDetails};

/// Split a comma-separated model answer into distinct, trimmed tags
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub struct TaggingHandler {
    step_name: String,
    extraction_step: String,
    orchestrator: Arc<dyn PipelineOrchestrator>,
    counter: Arc<dyn TokenCounter>,
    config: TaggingConfig,
}

/// What one source file contributed
#[derive(Default)]
struct FileTags {
    outcome: FileOutcome,
    tags: Vec<String>,
}

impl TaggingHandler {
    pub fn new(orchestrator: Arc<dyn PipelineOrchestrator>, counter: Arc<dyn TokenCounter>, config: TaggingConfig) -> Self {
        Self {
            step_name: steps::GENERATE_TAGS.to_string(),
            extraction_step: steps::DOCUMENT_INTELLIGENCE.to_string(),
            orchestrator,
            counter,
            config,
        }
    }

    /// Step whose processed-by mark means a file's extracted text is final
    pub fn with_extraction_step(mut self, step_name: impl Into<String>) -> Self {
        self.extraction_step = step_name.into();
        self
    }

    /// Ask the model for tags. Content below `min_tokens` is returned as is
    /// with `generated == false` and the model is not called.
    pub async fn tag_content(&self, content: &str, cancel: &CancelToken) -> Result<GeneratedText> {
        let prompt = ContentPrompt {
            template: &self.config.prompt,
            min_tokens: self.config.min_tokens,
            options: TextGenerationOptions {
                temperature: 0.0,
                max_tokens: Some(self.config.max_tokens),
            },
        };
        let generator = self.orchestrator.text_generator();
        prompt
            .run(generator.as_ref(), self.counter.as_ref(), content, cancel)
            .await
    }

    async fn tag_file(&self, pipeline: &DataPipeline, file: &FileDetails, cancel: &CancelToken) -> FileTags {
        let mut result = FileTags::default();

        for (index, name) in file.generated_names_of(ArtifactType::ExtractedText).into_iter().enumerate() {
            let Some(artifact) = file.generated_file(&name) else {
                continue;
            };
            if artifact.already_processed_by(&self.step_name) {
                tracing::trace!("[{}] {} already processed", self.step_name, name);
                continue;
            }
            if !mime::is_text(&artifact.mime_type) {
                tracing::warn!(
                    "[{}] Unsupported content type {} for {}, skipping",
                    self.step_name,
                    artifact.mime_type,
                    name
                );
                result.outcome.processed.push(name);
                continue;
            }

            match self.tag_artifact(pipeline, file, artifact, index, cancel).await {
                Ok(Some((tags, debug_file))) => {
                    result.tags.extend(tags);
                    result.outcome.generated.push(debug_file);
                    result.outcome.processed.push(name);
                }
                Ok(None) => result.outcome.processed.push(name),
                Err(e) => {
                    // Tags only count once the whole file went through, so
                    // nothing from this attempt is kept
                    return FileTags {
                        outcome: FileOutcome::failed(e),
                        tags: Vec::new(),
                    };
                }
            }
        }

        result
    }

    async fn tag_artifact(
        &self,
        pipeline: &DataPipeline,
        file: &FileDetails,
        artifact: &GeneratedFileDetails,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<Option<(Vec<String>, GeneratedFileDetails)>> {
        let content = self.orchestrator.read_text_file(pipeline, &artifact.name, cancel).await?;
        let generated = self.tag_content(&content, cancel).await?;

        if !generated.generated {
            tracing::warn!("[{}] {} is too short to tag", self.step_name, artifact.name);
            return Ok(None);
        }

        let raw = generated.text.trim().to_string();
        let tags = parse_tags(&raw);

        let details = GeneratedFileDetails::text(
            &file.id,
            file.handler_output_file_name(&self.step_name, index),
            mime::PLAIN_TEXT,
            ArtifactType::SyntheticData,
            &raw,
            pipeline.tags.clone().with_synthetic_tag(SYNTHETIC_TAGS),
        );
        self.orchestrator
            .write_file(pipeline, &details.name, Bytes::from(raw), cancel)
            .await?;

        tracing::info!(
            "[{}] Generated {} tag(s) for {}: {}",
            self.step_name,
            tags.len(),
            artifact.name,
            tags.join(", ")
        );
        Ok(Some((tags, details)))
    }
}

#[async_trait]
impl StepHandler for TaggingHandler {
    fn step_name(&self) -> &str {
        &self.step_name
    }

    async fn invoke(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> ReturnType {
        tracing::info!(
            "[{}] Generating '{}' tags for {}/{}",
            self.step_name,
            self.config.tag_key,
            pipeline.index,
            pipeline.document_id
        );

        for i in 0..pipeline.files.len() {
            if pipeline.files[i].already_processed_by(&self.step_name) {
                tracing::trace!("[{}] {} already processed", self.step_name, pipeline.files[i].name);
                continue;
            }

            let extracted = pipeline.files[i].already_processed_by(&self.extraction_step);
            let FileTags { outcome, tags } = self.tag_file(pipeline, &pipeline.files[i], cancel).await;
            if outcome.error.is_none() {
                let added = pipeline.tags.add_all(&self.config.tag_key, tags);
                if added > 0 {
                    tracing::debug!("[{}] Added {} new '{}' tag(s)", self.step_name, added, self.config.tag_key);
                }
            }

            let file_name = pipeline.files[i].name.clone();
            let error = if extracted {
                outcome.apply(&mut pipeline.files[i], &self.step_name)
            } else {
                tracing::debug!("[{}] {} is not extracted yet, leaving it pending", self.step_name, file_name);
                outcome.apply_to_artifacts(&mut pipeline.files[i], &self.step_name)
            };
            if let Some(error) = error {
                if let Some(result) = report_file_error(&self.step_name, pipeline, &file_name, &error) {
                    return result;
                }
            }
        }

        ReturnType::Success
    }
}
