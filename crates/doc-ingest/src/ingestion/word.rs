//! Word documents (.docx, and .doc after conversion)

use async_trait::async_trait;
use docx_rs::{DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent};

use super::legacy::LegacyConverter;
use super::{ExtractionInput, TextExtractor};
use crate::error::{Error, Result};
use crate::processing::CancelToken;
use crate::types::mime;

/// Decode a .docx into ordered text sections: one per paragraph, one per table
pub fn decode_sections(file_name: &str, data: &[u8]) -> Result<Vec<String>> {
    let doc = docx_rs::read_docx(data).map_err(|e| Error::decode(file_name, e.to_string()))?;

    let mut sections = Vec::new();
    for child in &doc.document.children {
        match child {
            DocumentChild::Paragraph(p) => sections.push(paragraph_text(p)),
            DocumentChild::Table(t) => sections.push(table_text(t)),
            _ => {}
        }
    }
    Ok(sections)
}

/// Concatenate the sections of a .docx, one per line
pub fn decode_docx(file_name: &str, data: &[u8]) -> Result<String> {
    let mut content = String::new();
    for section in decode_sections(file_name, data)? {
        content.push_str(&section);
        content.push('\n');
    }
    Ok(content)
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    push_paragraph_children(&paragraph.children, &mut text);
    text
}

fn push_paragraph_children(children: &[ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for child in &run.children {
                    match child {
                        RunChild::Text(t) => text.push_str(&t.text),
                        RunChild::Tab(_) => text.push('\t'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => push_paragraph_children(&link.children, text),
            _ => {}
        }
    }
}

/// Rows on separate lines, cells separated by tabs
fn table_text(table: &Table) -> String {
    let mut rows = Vec::new();
    for child in &table.rows {
        #[allow(unreachable_patterns)]
        let row = match child {
            docx_rs::TableChild::TableRow(row) => row,
            _ => continue,
        };
        let cells: Vec<String> = row
            .cells
            .iter()
            .filter_map(|child| match child {
                docx_rs::TableRowChild::TableCell(cell) => Some(cell),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .map(|cell| {
                cell.children
                    .iter()
                    .filter_map(|content| match content {
                        TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                        TableCellContent::Table(t) => Some(table_text(t)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        rows.push(cells.join("\t"));
    }
    rows.join("\n")
}

/// Word extractor; legacy .doc goes through LibreOffice first
pub struct WordExtractor {
    converter: LegacyConverter,
}

impl WordExtractor {
    pub fn new(converter: LegacyConverter) -> Self {
        Self { converter }
    }
}

#[async_trait]
impl TextExtractor for WordExtractor {
    fn name(&self) -> &str {
        "word"
    }

    fn mime_types(&self) -> &[&'static str] {
        &[mime::MS_WORD, mime::MS_WORD_X]
    }

    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String> {
        let data = if mime::is_legacy_office(&input.mime_type) {
            self.converter.convert(&input, cancel).await?
        } else {
            input.data.to_vec()
        };

        cancel.check()?;
        let file_name = input.file_name;
        tokio::task::spawn_blocking(move || decode_docx(&file_name, &data))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}
