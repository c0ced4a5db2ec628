//! Text extraction step: one `ExtractedText` artifact per source file

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::handler::{report_file_error, FileOutcome, ReturnType, StepHandler};
use super::{steps, CancelToken};
use crate::error::{Error, Result};
use crate::ingestion::{ExtractionInput, ExtractorRegistry};
use crate::providers::PipelineOrchestrator;
use crate::types::{mime, ArtifactType, DataPipeline, FileDetails, GeneratedFileDetails};

/// Name of the text artifact extracted from `source`
pub fn extracted_file_name(source: &str) -> String {
    format!("{}.extract.txt", source)
}

/// Dispatches each source file to the extractor registered for its MIME type
pub struct ExtractionHandler {
    step_name: String,
    orchestrator: Arc<dyn PipelineOrchestrator>,
    extractors: ExtractorRegistry,
}

impl ExtractionHandler {
    pub fn new(orchestrator: Arc<dyn PipelineOrchestrator>, extractors: ExtractorRegistry) -> Self {
        Self {
            step_name: steps::DOCUMENT_INTELLIGENCE.to_string(),
            orchestrator,
            extractors,
        }
    }

    /// Register under a different step name
    pub fn with_step_name(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = step_name.into();
        self
    }

    async fn extract_file(&self, pipeline: &DataPipeline, file: &FileDetails, cancel: &CancelToken) -> FileOutcome {
        match self.try_extract_file(pipeline, file, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::failed(e),
        }
    }

    async fn try_extract_file(
        &self,
        pipeline: &DataPipeline,
        file: &FileDetails,
        cancel: &CancelToken,
    ) -> Result<FileOutcome> {
        let Some(extractor) = self.extractors.get(file.mime_type()) else {
            if mime::MimeFamily::of(file.mime_type()).is_some() {
                // A known format whose extractor is switched off stays
                // pending for a run that has it
                return Err(Error::Config(format!(
                    "No extractor configured for {} ({})",
                    file.mime_type(),
                    file.name
                )));
            }

            // Retrying cannot help, so the file still counts as processed
            tracing::warn!(
                "[{}] Unsupported file type {} for {}, skipping",
                self.step_name,
                file.mime_type(),
                file.name
            );
            return Ok(FileOutcome::default());
        };

        let data = self.orchestrator.read_file(pipeline, &file.name, cancel).await?;
        tracing::debug!(
            "[{}] Extracting {} ({} bytes) with {}",
            self.step_name,
            file.name,
            data.len(),
            extractor.name()
        );

        let text = extractor
            .extract(ExtractionInput::new(file.name.as_str(), file.mime_type(), data), cancel)
            .await?;

        if text.is_empty() {
            tracing::info!("[{}] No text found in {}", self.step_name, file.name);
            return Ok(FileOutcome::default());
        }

        let details = GeneratedFileDetails::text(
            &file.id,
            extracted_file_name(&file.name),
            mime::PLAIN_TEXT,
            ArtifactType::ExtractedText,
            &text,
            pipeline.tags.clone(),
        );
        self.orchestrator
            .write_file(pipeline, &details.name, Bytes::from(text), cancel)
            .await?;

        tracing::info!(
            "[{}] Extracted {} characters from {} into {}",
            self.step_name,
            details.size,
            file.name,
            details.name
        );

        Ok(FileOutcome {
            generated: vec![details],
            ..Default::default()
        })
    }
}

#[async_trait]
impl StepHandler for ExtractionHandler {
    fn step_name(&self) -> &str {
        &self.step_name
    }

    async fn invoke(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> ReturnType {
        tracing::info!(
            "[{}] Extracting text from {} file(s) of {}/{}",
            self.step_name,
            pipeline.files.len(),
            pipeline.index,
            pipeline.document_id
        );

        for i in 0..pipeline.files.len() {
            if pipeline.files[i].already_processed_by(&self.step_name) {
                tracing::trace!("[{}] {} already processed", self.step_name, pipeline.files[i].name);
                continue;
            }

            let outcome = self.extract_file(pipeline, &pipeline.files[i], cancel).await;
            let file_name = pipeline.files[i].name.clone();
            if let Some(error) = outcome.apply(&mut pipeline.files[i], &self.step_name) {
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
    use crate::config::ExtractionConfig;
    use crate::ingestion::powerpoint::tests::build_pptx;
    use crate::processing::orchestrator::tests::{pipeline_with_files, services};
    use crate::providers::llm::tests::ScriptedGenerator;
    use crate::providers::ocr::tests::{document, ScriptedOcr};
    use crate::providers::{DocumentStore, OcrPolicy, OcrService, OcrStatus};
    use std::time::Duration;

    fn handler(orchestrator: Arc<dyn PipelineOrchestrator>) -> ExtractionHandler {
        ExtractionHandler::new(
            orchestrator,
            ExtractorRegistry::with_defaults(&ExtractionConfig::default(), None),
        )
    }

    #[tokio::test]
    async fn test_extracts_plain_text() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline = pipeline_with_files(&store, &[("memo.txt", b"Renewal memo")]).await;
        pipeline.tags.add("owner", "legal");

        let result = handler(services).invoke(&mut pipeline, &CancelToken::new()).await;
        assert_eq!(result, ReturnType::Success);

        let file = pipeline.file("memo.txt").unwrap();
        assert!(file.already_processed_by(steps::DOCUMENT_INTELLIGENCE));

        let artifact = file.generated_file("memo.txt.extract.txt").unwrap();
        assert_eq!(artifact.artifact_type, ArtifactType::ExtractedText);
        assert_eq!(artifact.parent_id, file.id);
        assert_eq!(artifact.size, 12);
        assert!(artifact.tags.contains("owner", "legal"));
        assert!(artifact.already_processed_by(steps::DOCUMENT_INTELLIGENCE));

        let stored = store.read_file("idx", "doc", "memo.txt.extract.txt").await.unwrap();
        assert_eq!(stored.as_ref(), b"Renewal memo");
        assert!(artifact.verify_content(&stored));
    }

    #[tokio::test]
    async fn test_failing_file_does_not_stop_siblings() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline = pipeline_with_files(
            &store,
            &[("a.txt", b"first"), ("b.docx", b"not a zip archive"), ("c.txt", b"third")],
        )
        .await;

        let result = handler(services).invoke(&mut pipeline, &CancelToken::new()).await;
        assert_eq!(result, ReturnType::Success);

        assert!(pipeline.file("a.txt").unwrap().generated_file("a.txt.extract.txt").is_some());
        assert!(pipeline.file("c.txt").unwrap().generated_file("c.txt.extract.txt").is_some());

        let failed = pipeline.file("b.docx").unwrap();
        assert!(!failed.already_processed_by(steps::DOCUMENT_INTELLIGENCE));
        assert!(failed.generated_files().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline = pipeline_with_files(&store, &[("memo.txt", b"Renewal memo")]).await;
        let handler = handler(services);

        handler.invoke(&mut pipeline, &CancelToken::new()).await;
        let first = pipeline.files.clone();
        let stored = store.len();

        assert_eq!(handler.invoke(&mut pipeline, &CancelToken::new()).await, ReturnType::Success);
        assert_eq!(pipeline.files, first);
        assert_eq!(store.len(), stored);
    }

    #[tokio::test]
    async fn test_unsupported_and_empty_files_are_marked_without_output() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline =
            pipeline_with_files(&store, &[("photo.png", b"\x89PNG"), ("empty.txt", b"")]).await;

        handler(services).invoke(&mut pipeline, &CancelToken::new()).await;

        for name in ["photo.png", "empty.txt"] {
            let file = pipeline.file(name).unwrap();
            assert!(file.already_processed_by(steps::DOCUMENT_INTELLIGENCE));
            assert!(file.generated_files().is_empty());
        }
        assert!(!store.file_exists("idx", "doc", "empty.txt.extract.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_presentation_skips_hidden_slides() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let pptx = build_pptx(&[(false, &["Intro"]), (true, &["Secret"]), (false, &["Wrap", "up"])]);
        let mut pipeline = pipeline_with_files(&store, &[("deck.pptx", &pptx)]).await;

        handler(services).invoke(&mut pipeline, &CancelToken::new()).await;

        let stored = store.read_file("idx", "doc", "deck.pptx.extract.txt").await.unwrap();
        assert_eq!(String::from_utf8_lossy(&stored), "Intro\nWrap up");
    }

    #[tokio::test]
    async fn test_pdf_goes_through_ocr() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let ocr = Arc::new(ScriptedOcr::new(vec![
            OcrStatus::Running,
            OcrStatus::Succeeded(document(&[&["Page one"], &["Page two"]])),
        ]));
        let policy = OcrPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        };
        let registry = ExtractorRegistry::with_defaults(
            &ExtractionConfig::default(),
            Some((ocr.clone() as Arc<dyn OcrService>, policy)),
        );
        let mut pipeline = pipeline_with_files(&store, &[("scan.pdf", b"%PDF-1.7")]).await;

        ExtractionHandler::new(services, registry)
            .invoke(&mut pipeline, &CancelToken::new())
            .await;

        let stored = store.read_file("idx", "doc", "scan.pdf.extract.txt").await.unwrap();
        assert_eq!(String::from_utf8_lossy(&stored), "Page one\r\nPage two\r\n");
        assert_eq!(ocr.submitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_files_unmarked() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline = pipeline_with_files(&store, &[("memo.txt", b"Renewal memo")]).await;
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = handler(services).invoke(&mut pipeline, &cancel).await;
        assert_eq!(result, ReturnType::TransientFailure);
        assert!(!pipeline.file("memo.txt").unwrap().already_processed_by(steps::DOCUMENT_INTELLIGENCE));
    }

    #[tokio::test]
    async fn test_pdf_waits_for_ocr_configuration() {
        let (services, store) = services(Arc::new(ScriptedGenerator::new(vec![])));
        let mut pipeline = pipeline_with_files(&store, &[("scan.pdf", b"%PDF-1.7")]).await;

        let result = handler(services.clone()).invoke(&mut pipeline, &CancelToken::new()).await;
        assert_eq!(result, ReturnType::Success);
        let file = pipeline.file("scan.pdf").unwrap();
        assert!(!file.already_processed_by(steps::DOCUMENT_INTELLIGENCE));
        assert!(file.generated_files().is_empty());

        // The next run has OCR and picks the file up
        let ocr = Arc::new(ScriptedOcr::new(vec![OcrStatus::Succeeded(document(&[&["Invoice 42"]]))]));
        let policy = OcrPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        };
        let registry = ExtractorRegistry::with_defaults(
            &ExtractionConfig::default(),
            Some((ocr as Arc<dyn OcrService>, policy)),
        );
        ExtractionHandler::new(services, registry)
            .invoke(&mut pipeline, &CancelToken::new())
            .await;

        let file = pipeline.file("scan.pdf").unwrap();
        assert!(file.already_processed_by(steps::DOCUMENT_INTELLIGENCE));
        assert!(file.generated_file("scan.pdf.extract.txt").is_some());
        assert!(store.file_exists("idx", "doc", "scan.pdf.extract.txt").await.unwrap());
    }
}
