//! Summarization step: a synthetic summary per extracted text

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::handler::{report_file_error, FileOutcome, ReturnType, StepHandler};
use super::prompt::{ContentPrompt, GeneratedText};
use super::{steps, CancelToken};
use crate::config::SummarizationConfig;
use crate::error::Result;
use crate::ingestion::TokenCounter;
use crate::providers::{PipelineOrchestrator, TextGenerationOptions};
use crate::types::tags::SYNTHETIC_SUMMARY;
use crate::types::{mime, ArtifactType, DataPipeline, FileDetails, GeneratedFileDetails};

/// Drop a leading label such as `Summary:` the model tends to echo back
fn strip_label(text: &str, label: &str) -> String {
    let text = text.trim();
    let label = label.trim();
    if !label.is_empty() {
        if let Some(rest) = text.strip_prefix(label) {
            return rest.trim_start().to_string();
        }
    }
    text.to_string()
}

pub struct SummarizationHandler {
    step_name: String,
    extraction_step: String,
    orchestrator: Arc<dyn PipelineOrchestrator>,
    counter: Arc<dyn TokenCounter>,
    config: SummarizationConfig,
}

impl SummarizationHandler {
    pub fn new(
        orchestrator: Arc<dyn PipelineOrchestrator>,
        counter: Arc<dyn TokenCounter>,
        config: SummarizationConfig,
    ) -> Self {
        Self {
            step_name: steps::SUMMARIZE.to_string(),
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

    /// Summarize `content`; too-short content comes back unchanged with
    /// `generated == false`
    pub async fn summarize(&self, content: &str, cancel: &CancelToken) -> Result<GeneratedText> {
        let prompt = ContentPrompt {
            template: &self.config.prompt,
            min_tokens: self.config.min_tokens,
            options: TextGenerationOptions {
                temperature: 0.0,
                max_tokens: Some(self.config.max_tokens),
            },
        };
        let generator = self.orchestrator.text_generator();
        let mut result = prompt
            .run(generator.as_ref(), self.counter.as_ref(), content, cancel)
            .await?;

        if result.generated {
            result.text = strip_label(&result.text, &self.config.strip_label);
        }
        Ok(result)
    }

    async fn summarize_file(&self, pipeline: &DataPipeline, file: &FileDetails, cancel: &CancelToken) -> FileOutcome {
        let mut outcome = FileOutcome::default();

        // Output names are numbered over every extracted text so a retry
        // lands on the same name
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
                outcome.processed.push(name);
                continue;
            }

            match self.summarize_artifact(pipeline, file, artifact, index, cancel).await {
                Ok(summary) => {
                    outcome.generated.extend(summary);
                    outcome.processed.push(name);
                }
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            }
        }

        outcome
    }

    async fn summarize_artifact(
        &self,
        pipeline: &DataPipeline,
        file: &FileDetails,
        artifact: &GeneratedFileDetails,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<Option<GeneratedFileDetails>> {
        let content = self.orchestrator.read_text_file(pipeline, &artifact.name, cancel).await?;
        let summary = self.summarize(&content, cancel).await?;

        if !summary.generated {
            tracing::warn!("[{}] {} is too short to summarize", self.step_name, artifact.name);
            return Ok(None);
        }
        if summary.text.is_empty() {
            tracing::warn!("[{}] Empty summary generated for {}", self.step_name, artifact.name);
            return Ok(None);
        }

        let details = GeneratedFileDetails::text(
            &file.id,
            file.handler_output_file_name(&self.step_name, index),
            mime::PLAIN_TEXT,
            ArtifactType::SyntheticData,
            &summary.text,
            pipeline.tags.clone().with_synthetic_tag(SYNTHETIC_SUMMARY),
        );
        self.orchestrator
            .write_file(pipeline, &details.name, Bytes::from(summary.text), cancel)
            .await?;

        tracing::info!(
            "[{}] Summarized {} into {} ({} characters)",
            self.step_name,
            artifact.name,
            details.name,
            details.size
        );
        Ok(Some(details))
    }
}

#[async_trait]
impl StepHandler for SummarizationHandler {
    fn step_name(&self) -> &str {
        &self.step_name
    }

    async fn invoke(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> ReturnType {
        tracing::info!(
            "[{}] Summarizing {}/{} with {}",
            self.step_name,
            pipeline.index,
            pipeline.document_id,
            self.orchestrator.text_generator().model()
        );

        for i in 0..pipeline.files.len() {
            if pipeline.files[i].already_processed_by(&self.step_name) {
                tracing::trace!("[{}] {} already processed", self.step_name, pipeline.files[i].name);
                continue;
            }

            let extracted = pipeline.files[i].already_processed_by(&self.extraction_step);
            let outcome = self.summarize_file(pipeline, &pipeline.files[i], cancel).await;
            let file_name = pipeline.files[i].name.clone();

            // Until extraction finished, only the artifacts are marked so a
            // retried extraction still gets summarized
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ingestion::WordCounter;
    use crate::config::ExtractionConfig;
    use crate::ingestion::ExtractorRegistry;
    use crate::processing::orchestrator::tests::{pipeline_missing_source, services, with_extracted_text};
    use crate::processing::ExtractionHandler;
    use crate::providers::llm::tests::ScriptedGenerator;
    use crate::providers::DocumentStore;

    const MEMO: &str = "The parties agree to renew the supply agreement for another two years";

    fn config() -> SummarizationConfig {
        SummarizationConfig {
            min_tokens: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("Summary: short text", "Summary: "), "short text");
        assert_eq!(strip_label("  Summary:short text\n", "Summary: "), "short text");
        assert_eq!(strip_label("No label here", "Summary: "), "No label here");
        assert_eq!(strip_label("Summary: kept", ""), "Summary: kept");
    }

    #[tokio::test]
    async fn test_writes_summary_artifact() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            "Summary: Supply agreement renewed for two years.".to_string(),
        )]));
        let (services, store) = services(generator.clone());
        let mut pipeline = with_extracted_text(&store, &[("memo.txt", MEMO)]).await;
        pipeline.tags.add("owner", "legal");

        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());
        assert_eq!(handler.invoke(&mut pipeline, &CancelToken::new()).await, ReturnType::Success);

        let file = pipeline.file("memo.txt").unwrap();
        assert!(file.already_processed_by(steps::SUMMARIZE));
        assert!(file
            .generated_file("memo.txt.extract.txt")
            .unwrap()
            .already_processed_by(steps::SUMMARIZE));

        let summary = file.generated_file("memo.txt.summarize.0.txt").unwrap();
        assert_eq!(summary.artifact_type, ArtifactType::SyntheticData);
        assert!(summary.tags.is_synthetic(SYNTHETIC_SUMMARY));
        assert!(summary.tags.contains("owner", "legal"));
        assert!(!pipeline.tags.is_synthetic(SYNTHETIC_SUMMARY));
        assert!(summary.already_processed_by(steps::SUMMARIZE));

        let stored = store.read_file("idx", "doc", "memo.txt.summarize.0.txt").await.unwrap();
        assert_eq!(stored.as_ref(), b"Supply agreement renewed for two years.");
        assert!(summary.verify_content(&stored));

        let prompts = generator.prompts.lock();
        assert!(prompts[0].0.contains(MEMO));
        assert_eq!(prompts[0].1.temperature, 0.0);
        assert_eq!(prompts[0].1.max_tokens, Some(3000));
    }

    #[tokio::test]
    async fn test_second_run_does_not_regenerate() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("A summary.".to_string())]));
        let (services, store) = services(generator.clone());
        let mut pipeline = with_extracted_text(&store, &[("memo.txt", MEMO)]).await;
        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());

        handler.invoke(&mut pipeline, &CancelToken::new()).await;
        let files = pipeline.files.clone();
        assert_eq!(handler.invoke(&mut pipeline, &CancelToken::new()).await, ReturnType::Success);

        assert_eq!(generator.calls(), 1);
        assert_eq!(pipeline.files, files);
    }

    #[tokio::test]
    async fn test_generation_failure_is_isolated() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(Error::remote("scripted", "model overloaded")),
            Ok("Second summary.".to_string()),
        ]));
        let (services, store) = services(generator);
        let mut pipeline = with_extracted_text(&store, &[("a.txt", MEMO), ("b.txt", MEMO)]).await;

        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());
        assert_eq!(handler.invoke(&mut pipeline, &CancelToken::new()).await, ReturnType::Success);

        let failed = pipeline.file("a.txt").unwrap();
        assert!(!failed.already_processed_by(steps::SUMMARIZE));
        assert!(failed.generated_file("a.txt.summarize.0.txt").is_none());

        let ok = pipeline.file("b.txt").unwrap();
        assert!(ok.already_processed_by(steps::SUMMARIZE));
        assert!(ok.generated_file("b.txt.summarize.0.txt").is_some());
    }

    #[tokio::test]
    async fn test_short_text_is_marked_without_summary() {
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let (services, store) = services(generator.clone());
        let mut pipeline = with_extracted_text(&store, &[("note.txt", "tiny")]).await;

        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());
        handler.invoke(&mut pipeline, &CancelToken::new()).await;

        let file = pipeline.file("note.txt").unwrap();
        assert!(file.already_processed_by(steps::SUMMARIZE));
        assert_eq!(file.generated_files().len(), 1);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_summarizes_after_extraction_retry() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("Supply agreement renewed.".to_string())]));
        let (services, store) = services(generator.clone());
        let (mut pipeline, source) = pipeline_missing_source("memo.txt", MEMO.as_bytes());

        let extraction = ExtractionHandler::new(
            services.clone(),
            ExtractorRegistry::with_defaults(&ExtractionConfig::default(), None),
        );
        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());

        // Source bytes missing: extraction fails and nothing is left to summarize
        extraction.invoke(&mut pipeline, &CancelToken::new()).await;
        assert_eq!(handler.invoke(&mut pipeline, &CancelToken::new()).await, ReturnType::Success);
        let file = pipeline.file("memo.txt").unwrap();
        assert!(!file.already_processed_by(steps::DOCUMENT_INTELLIGENCE));
        assert!(!file.already_processed_by(steps::SUMMARIZE));
        assert_eq!(generator.calls(), 0);

        store.write_file("idx", "doc", "memo.txt", source).await.unwrap();
        extraction.invoke(&mut pipeline, &CancelToken::new()).await;
        handler.invoke(&mut pipeline, &CancelToken::new()).await;

        let file = pipeline.file("memo.txt").unwrap();
        assert!(file.already_processed_by(steps::SUMMARIZE));
        assert!(file.generated_file("memo.txt.summarize.0.txt").is_some());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_extraction_step_gates_file_mark() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("A summary.".to_string())]));
        let (services, store) = services(generator);
        let mut pipeline = with_extracted_text(&store, &[("memo.txt", MEMO)]).await;

        let handler =
            SummarizationHandler::new(services, Arc::new(WordCounter), config()).with_extraction_step("ocr-only");
        handler.invoke(&mut pipeline, &CancelToken::new()).await;

        let file = pipeline.file("memo.txt").unwrap();
        assert!(!file.already_processed_by(steps::SUMMARIZE));
        assert!(file
            .generated_file("memo.txt.extract.txt")
            .unwrap()
            .already_processed_by(steps::SUMMARIZE));
        assert!(file.generated_file("memo.txt.summarize.0.txt").is_some());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_earlier_marks() {
        let cancel = CancelToken::new();
        let generator = Arc::new(
            ScriptedGenerator::new(vec![Ok("First summary.".to_string())]).cancelling_on_call(2, cancel.clone()),
        );
        let (services, store) = services(generator.clone());
        let mut pipeline =
            with_extracted_text(&store, &[("a.txt", MEMO), ("b.txt", MEMO), ("c.txt", MEMO)]).await;

        let handler = SummarizationHandler::new(services, Arc::new(WordCounter), config());
        assert_eq!(handler.invoke(&mut pipeline, &cancel).await, ReturnType::TransientFailure);

        let done = pipeline.file("a.txt").unwrap();
        assert!(done.already_processed_by(steps::SUMMARIZE));
        assert!(done.generated_file("a.txt.summarize.0.txt").is_some());

        for name in ["b.txt", "c.txt"] {
            let file = pipeline.file(name).unwrap();
            assert!(!file.already_processed_by(steps::SUMMARIZE), "{} should stay pending", name);
            assert_eq!(file.generated_files().len(), 1);
        }
        assert_eq!(generator.calls(), 2);
    }
}
