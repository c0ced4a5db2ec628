//! MIME type to extractor strategy table

use std::collections::HashMap;
use std::sync::Arc;

use super::excel::ExcelExtractor;
use super::legacy::LegacyConverter;
use super::pdf::PdfOcrExtractor;
use super::powerpoint::PowerPointExtractor;
use super::text::PlainTextExtractor;
use super::word::WordExtractor;
use super::TextExtractor;
use crate::config::ExtractionConfig;
use crate::providers::ocr::{OcrPolicy, OcrService};

/// Extractors keyed by the MIME types they declare. Registering a new
/// extractor for an existing MIME type replaces the previous one.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format. PDFs are only supported when an
    /// OCR service is supplied.
    pub fn with_defaults(config: &ExtractionConfig, ocr: Option<(Arc<dyn OcrService>, OcrPolicy)>) -> Self {
        let converter = LegacyConverter::new(config.legacy.clone());
        let mut registry = Self::new();

        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(WordExtractor::new(converter.clone())));
        registry.register(Arc::new(PowerPointExtractor::new(
            config.powerpoint.clone(),
            converter,
        )));
        registry.register(Arc::new(ExcelExtractor::new(config.excel.clone())));

        match ocr {
            Some((service, policy)) => registry.register(Arc::new(PdfOcrExtractor::new(service, policy))),
            None => tracing::warn!("No OCR service configured, PDF files will not be extracted"),
        }

        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for mime_type in extractor.mime_types() {
            tracing::debug!("Registering {} extractor for {}", extractor.name(), mime_type);
            self.extractors.insert(mime_type.to_string(), Arc::clone(&extractor));
        }
    }

    pub fn get(&self, mime_type: &str) -> Option<Arc<dyn TextExtractor>> {
        self.extractors.get(mime_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::ExtractionInput;
    use crate::processing::CancelToken;
    use crate::types::mime;
    use async_trait::async_trait;

    struct Upper;

    #[async_trait]
    impl TextExtractor for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn mime_types(&self) -> &[&'static str] {
            &[mime::PLAIN_TEXT]
        }

        async fn extract(&self, input: ExtractionInput, _cancel: &CancelToken) -> crate::Result<String> {
            Ok(String::from_utf8_lossy(&input.data).to_uppercase())
        }
    }

    #[test]
    fn test_defaults_without_ocr() {
        let registry = ExtractorRegistry::with_defaults(&ExtractionConfig::default(), None);
        for mime_type in [mime::PLAIN_TEXT, mime::MARKDOWN, mime::JSON, mime::MS_WORD_X, mime::MS_EXCEL] {
            assert!(registry.get(mime_type).is_some(), "{} should be supported", mime_type);
        }
        assert!(registry.get(mime::PDF).is_none());
        assert!(registry.get("image/png").is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_entry() {
        let mut registry = ExtractorRegistry::with_defaults(&ExtractionConfig::default(), None);
        registry.register(Arc::new(Upper));

        let extractor = registry.get(mime::PLAIN_TEXT).unwrap();
        assert_eq!(extractor.name(), "upper");
        let text = extractor
            .extract(
                ExtractionInput::new("a.txt", mime::PLAIN_TEXT, b"abc".to_vec()),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(text, "ABC");

        // markdown keeps the built-in extractor
        assert_eq!(registry.get(mime::MARKDOWN).unwrap().name(), "plain-text");
    }
}
