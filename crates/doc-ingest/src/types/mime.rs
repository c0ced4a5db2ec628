//! MIME types understood by the pipeline

pub const PLAIN_TEXT: &str = "text/plain";
pub const MARKDOWN: &str = "text/markdown";
pub const JSON: &str = "application/json";
pub const PDF: &str = "application/pdf";
pub const MS_WORD: &str = "application/msword";
pub const MS_WORD_X: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MS_POWERPOINT: &str = "application/vnd.ms-powerpoint";
pub const MS_POWERPOINT_X: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MS_EXCEL: &str = "application/vnd.ms-excel";
pub const MS_EXCEL_X: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Document formats the pipeline knows how to extract, whether or not the
/// extractor is enabled in the current configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeFamily {
    /// JSON, plain text, markdown
    Text,
    /// Word (legacy and OOXML)
    Word,
    /// PowerPoint (legacy and OOXML)
    PowerPoint,
    /// Excel (legacy and OOXML)
    Excel,
    /// PDF (remote OCR)
    Pdf,
}

impl MimeFamily {
    /// Classify a MIME type, `None` when no family handles it
    pub fn of(mime_type: &str) -> Option<Self> {
        match mime_type {
            PLAIN_TEXT | MARKDOWN | JSON => Some(Self::Text),
            MS_WORD | MS_WORD_X => Some(Self::Word),
            MS_POWERPOINT | MS_POWERPOINT_X => Some(Self::PowerPoint),
            MS_EXCEL | MS_EXCEL_X => Some(Self::Excel),
            PDF => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Whether the MIME type is a pre-OOXML Office binary format
pub fn is_legacy_office(mime_type: &str) -> bool {
    matches!(mime_type, MS_WORD | MS_POWERPOINT)
}

/// Whether the synthetic-data handlers can read this artifact as text
pub fn is_text(mime_type: &str) -> bool {
    matches!(mime_type, PLAIN_TEXT | MARKDOWN)
}

/// Detect the MIME type of an uploaded file from its name
pub fn from_file_name(file_name: &str) -> String {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    // mime_guess maps these to less specific types
    match extension.as_str() {
        "md" | "markdown" => return MARKDOWN.to_string(),
        "txt" | "text" => return PLAIN_TEXT.to_string(),
        _ => {}
    }

    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
