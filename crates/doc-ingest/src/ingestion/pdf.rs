//! PDF text through the remote OCR service

use async_trait::async_trait;
use std::sync::Arc;

use super::{ExtractionInput, TextExtractor};
use crate::error::Result;
use crate::processing::CancelToken;
use crate::providers::ocr::{analyze_to_completion, OcrPolicy, OcrService};
use crate::types::mime;

/// Sends PDFs to an [`OcrService`] and waits for the full analysis
pub struct PdfOcrExtractor {
    service: Arc<dyn OcrService>,
    policy: OcrPolicy,
}

impl PdfOcrExtractor {
    pub fn new(service: Arc<dyn OcrService>, policy: OcrPolicy) -> Self {
        Self { service, policy }
    }
}

#[async_trait]
impl TextExtractor for PdfOcrExtractor {
    fn name(&self) -> &str {
        "pdf-ocr"
    }

    fn mime_types(&self) -> &[&'static str] {
        &[mime::PDF]
    }

    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String> {
        let document =
            analyze_to_completion(self.service.as_ref(), input.data, self.policy, cancel).await?;

        tracing::debug!(
            "[{}] {} recognized {} lines on {} pages",
            input.file_name,
            self.service.name(),
            document.line_count(),
            document.pages.len()
        );

        Ok(document.to_text())
    }
}
