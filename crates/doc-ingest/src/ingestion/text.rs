//! Plain text, markdown and JSON pass-through

use async_trait::async_trait;

use super::{ExtractionInput, TextExtractor};
use crate::error::Result;
use crate::processing::CancelToken;
use crate::types::mime;

/// Decode raw bytes as UTF-8 text, replacing invalid sequences and
/// dropping a leading byte order mark
pub fn decode_text(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// Copies text-like files unchanged
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn mime_types(&self) -> &[&'static str] {
        &[mime::PLAIN_TEXT, mime::MARKDOWN, mime::JSON]
    }

    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String> {
        cancel.check()?;
        Ok(decode_text(&input.data))
    }
}
