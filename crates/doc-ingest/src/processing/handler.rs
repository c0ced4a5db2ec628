//! Step handler contract shared by every pipeline stage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CancelToken;
use crate::error::Error;
use crate::types::{DataPipeline, FileDetails, GeneratedFileDetails};

/// Outcome of one handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Success,
    /// Retrying the step later may succeed
    TransientFailure,
    /// The pipeline cannot continue
    FatalFailure,
}

/// One named pipeline stage.
///
/// Handlers skip every file or artifact whose processed-by set already holds
/// their step name, and add it once output for that file is stored. A failure
/// on one file is logged and leaves that file unmarked; siblings still run.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Name under which the handler is registered and recorded in processed-by sets
    fn step_name(&self) -> &str;

    /// Process every pending file of the pipeline
    async fn invoke(&self, pipeline: &mut DataPipeline, cancel: &CancelToken) -> ReturnType;
}

/// Results for one source file, buffered while its artifacts are iterated
/// and merged into the file afterwards
#[derive(Debug, Default)]
pub(crate) struct FileOutcome {
    /// Existing artifacts this step consumed
    pub processed: Vec<String>,
    /// New artifacts this step wrote
    pub generated: Vec<GeneratedFileDetails>,
    /// First failure; the file stays unmarked when set
    pub error: Option<Error>,
}

impl FileOutcome {
    pub fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Commit marks and new artifacts, returning the failure if any. The
    /// file itself is marked only when nothing failed.
    pub fn apply(self, file: &mut FileDetails, step_name: &str) -> Option<Error> {
        let error = self.apply_to_artifacts(file, step_name);
        if error.is_none() {
            file.mark_processed_by(step_name);
        }
        error
    }

    /// Commit artifact marks and new artifacts, leaving the file's own
    /// processed-by set alone
    pub fn apply_to_artifacts(self, file: &mut FileDetails, step_name: &str) -> Option<Error> {
        for name in &self.processed {
            if let Some(artifact) = file.generated_file_mut(name) {
                artifact.mark_processed_by(step_name);
            }
        }
        for mut artifact in self.generated {
            artifact.mark_processed_by(step_name);
            file.add_generated_file(artifact);
        }
        self.error
    }
}

/// Log a per-file failure. Returns the handler result to report when the
/// failure must stop the loop (cancellation), `None` to continue.
pub(crate) fn report_file_error(
    step_name: &str,
    pipeline: &DataPipeline,
    file_name: &str,
    error: &Error,
) -> Option<ReturnType> {
    if error.is_cancelled() {
        tracing::warn!(
            file = file_name,
            index = %pipeline.index,
            document_id = %pipeline.document_id,
            "[{}] Cancelled while processing {}",
            step_name,
            file_name
        );
        return Some(ReturnType::TransientFailure);
    }

    tracing::error!(
        file = file_name,
        index = %pipeline.index,
        document_id = %pipeline.document_id,
        "[{}] Failed to process {}: {}",
        step_name,
        file_name,
        error
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{mime, ArtifactType, TagCollection};

    fn file_with_extract() -> FileDetails {
        let mut file = FileDetails::new("f1", "memo.txt", 10, mime::PLAIN_TEXT);
        file.add_generated_file(GeneratedFileDetails::text(
            "f1",
            "memo.txt.extract.txt",
            mime::PLAIN_TEXT,
            ArtifactType::ExtractedText,
            "hello",
            TagCollection::new(),
        ));
        file
    }

    #[test]
    fn test_apply_success_marks_everything() {
        let mut file = file_with_extract();
        let outcome = FileOutcome {
            processed: vec!["memo.txt.extract.txt".to_string()],
            generated: vec![GeneratedFileDetails::text(
                "f1",
                "memo.txt.summarize.0.txt",
                mime::PLAIN_TEXT,
                ArtifactType::SyntheticData,
                "short",
                TagCollection::new(),
            )],
            error: None,
        };

        assert!(outcome.apply(&mut file, "summarize").is_none());
        assert!(file.already_processed_by("summarize"));
        assert!(file.generated_file("memo.txt.extract.txt").unwrap().already_processed_by("summarize"));
        assert!(file
            .generated_file("memo.txt.summarize.0.txt")
            .unwrap()
            .already_processed_by("summarize"));
    }

    #[test]
    fn test_apply_failure_keeps_file_unmarked() {
        let mut file = file_with_extract();
        let outcome = FileOutcome::failed(Error::remote("llm", "boom"));
        assert!(outcome.apply(&mut file, "summarize").is_some());
        assert!(!file.already_processed_by("summarize"));
    }

    #[test]
    fn test_apply_to_artifacts_leaves_file_unmarked() {
        let mut file = file_with_extract();
        let outcome = FileOutcome {
            processed: vec!["memo.txt.extract.txt".to_string()],
            ..Default::default()
        };

        assert!(outcome.apply_to_artifacts(&mut file, "summarize").is_none());
        assert!(!file.already_processed_by("summarize"));
        assert!(file.generated_file("memo.txt.extract.txt").unwrap().already_processed_by("summarize"));
    }

    #[test]
    fn test_cancellation_stops_the_loop() {
        let pipeline = DataPipeline::new("idx", "doc", TagCollection::new(), vec![]);
        assert_eq!(
            report_file_error("step", &pipeline, "a.txt", &Error::Cancelled),
            Some(ReturnType::TransientFailure)
        );
        assert_eq!(
            report_file_error("step", &pipeline, "a.txt", &Error::decode("a.txt", "bad")),
            None
        );
    }
}
