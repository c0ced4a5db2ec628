//! Excel workbooks (.xlsx and legacy .xls, both read natively by calamine)

use async_trait::async_trait;
use calamine::{Data, Reader};
use serde::{Deserialize, Serialize};

use super::powerpoint::render_template;
use super::{ExtractionInput, TextExtractor};
use crate::error::{Error, Result};
use crate::processing::CancelToken;
use crate::types::mime;

/// Worksheet serialization options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelOptions {
    pub with_worksheet_number: bool,
    pub with_end_of_worksheet_marker: bool,
    /// Wrap every cell value in double quotes
    pub with_quotes: bool,
    pub worksheet_number_template: String,
    pub end_of_worksheet_marker_template: String,
    pub column_separator: String,
    pub row_prefix: String,
    pub row_suffix: String,
}

impl Default for ExcelOptions {
    fn default() -> Self {
        Self {
            with_worksheet_number: true,
            with_end_of_worksheet_marker: false,
            with_quotes: true,
            worksheet_number_template: "# Worksheet {number}".to_string(),
            end_of_worksheet_marker_template: "# End of worksheet {number}".to_string(),
            column_separator: ", ".to_string(),
            row_prefix: String::new(),
            row_suffix: String::new(),
        }
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

/// Serialize one row; `None` for rows without any value
pub fn format_row(row: &[Data], options: &ExcelOptions) -> Option<String> {
    if row.iter().all(|cell| matches!(cell, Data::Empty)) {
        return None;
    }

    let cells: Vec<String> = row
        .iter()
        .map(|cell| {
            let text = cell_text(cell);
            if options.with_quotes {
                format!("\"{}\"", text.replace('"', "\"\""))
            } else {
                text
            }
        })
        .collect();

    Some(format!(
        "{}{}{}",
        options.row_prefix,
        cells.join(&options.column_separator),
        options.row_suffix
    ))
}

/// Extract every worksheet of a workbook as text
pub fn decode_workbook(file_name: &str, data: &[u8], options: &ExcelOptions) -> Result<String> {
    let cursor = std::io::Cursor::new(data);
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| Error::decode(file_name, e.to_string()))?;

    let mut content = String::new();
    for (index, sheet_name) in workbook.sheet_names().into_iter().enumerate() {
        let number = index + 1;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::decode(file_name, format!("worksheet '{}': {}", sheet_name, e)))?;

        if options.with_worksheet_number {
            content.push_str(&render_template(&options.worksheet_number_template, number));
            content.push('\n');
        }

        for row in range.rows() {
            if let Some(line) = format_row(row, options) {
                content.push_str(&line);
                content.push('\n');
            }
        }

        if options.with_end_of_worksheet_marker {
            content.push_str(&render_template(&options.end_of_worksheet_marker_template, number));
            content.push('\n');
        }
    }

    Ok(content.trim().to_string())
}

pub struct ExcelExtractor {
    options: ExcelOptions,
}

impl ExcelExtractor {
    pub fn new(options: ExcelOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TextExtractor for ExcelExtractor {
    fn name(&self) -> &str {
        "excel"
    }

    fn mime_types(&self) -> &[&'static str] {
        &[mime::MS_EXCEL, mime::MS_EXCEL_X]
    }

    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String> {
        cancel.check()?;
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || decode_workbook(&input.file_name, &input.data, &options))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}
