//! Format extractors: raw document bytes to plain text

pub mod excel;
pub mod legacy;
pub mod pdf;
pub mod powerpoint;
pub mod registry;
pub mod text;
pub mod tokenizer;
pub mod word;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::processing::CancelToken;

pub use excel::{ExcelExtractor, ExcelOptions};
pub use legacy::{LegacyConversionConfig, LegacyConverter};
pub use pdf::PdfOcrExtractor;
pub use powerpoint::{PowerPointExtractor, PowerPointOptions};
pub use registry::ExtractorRegistry;
pub use text::PlainTextExtractor;
pub use tokenizer::{O200kTokenCounter, TokenCounter, WordCounter};
pub use word::WordExtractor;

/// A source file handed to an extractor
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ExtractionInput {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Turns the bytes of one document family into text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &str;

    /// MIME types this extractor handles
    fn mime_types(&self) -> &[&'static str];

    /// Extract the full text. The same bytes always yield the same text.
    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String>;
}
