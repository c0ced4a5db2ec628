//! PowerPoint presentations (.pptx, and .ppt after conversion)
//!
//! Slides are read in presentation order (`p:sldIdLst`), not archive order.
//! Every slide counts towards numbering, including hidden ones, so the
//! `{number}` in the markers always matches the slide number shown by
//! PowerPoint.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

use super::legacy::LegacyConverter;
use super::{ExtractionInput, TextExtractor};
use crate::error::{Error, Result};
use crate::processing::CancelToken;
use crate::types::mime;

static NUMBER_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{number\}").expect("Invalid regex"));

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Slide text layout options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerPointOptions {
    /// Line written before each slide when `with_slide_number` is set
    pub slide_number_template: String,
    /// Line written after each slide when `with_end_of_slide_marker` is set
    pub end_of_slide_marker_template: String,
    pub with_slide_number: bool,
    pub with_end_of_slide_marker: bool,
    pub skip_hidden_slides: bool,
}

impl Default for PowerPointOptions {
    fn default() -> Self {
        Self {
            slide_number_template: "# Slide {number}".to_string(),
            end_of_slide_marker_template: "# End of slide {number}".to_string(),
            with_slide_number: false,
            with_end_of_slide_marker: false,
            skip_hidden_slides: true,
        }
    }
}

/// Substitute `{number}` (any case) in a marker template
pub fn render_template(template: &str, number: usize) -> String {
    NUMBER_PLACEHOLDER
        .replace_all(template, number.to_string().as_str())
        .into_owned()
}

/// Text runs and visibility of one slide
#[derive(Debug, Default, PartialEq, Eq)]
struct Slide {
    hidden: bool,
    runs: Vec<String>,
}

/// Extract the text of a .pptx, slide by slide
pub fn decode_pptx(file_name: &str, data: &[u8], options: &PowerPointOptions) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| Error::decode(file_name, e.to_string()))?;

    let presentation = read_part(&mut archive, PRESENTATION_PART)
        .ok_or_else(|| Error::decode(file_name, "missing ppt/presentation.xml"))?;
    let slide_ids = parse_slide_ids(file_name, &presentation)?;
    if slide_ids.is_empty() {
        return Ok(String::new());
    }

    let relationships = match read_part(&mut archive, PRESENTATION_RELS) {
        Some(rels) => parse_relationships(file_name, &rels)?,
        None => HashMap::new(),
    };

    let mut content = String::new();
    for (index, relationship_id) in slide_ids.iter().enumerate() {
        let number = index + 1;

        let Some(target) = relationships.get(relationship_id) else {
            tracing::debug!("[{}] Slide {} has no relationship target", file_name, number);
            continue;
        };
        let Some(xml) = read_part(&mut archive, &resolve_target(target)) else {
            tracing::debug!("[{}] Slide part {} not found", file_name, target);
            continue;
        };

        let slide = parse_slide(file_name, &xml)?;
        if options.skip_hidden_slides && slide.hidden {
            continue;
        }

        let text = slide.runs.join(" ");
        if text.is_empty() {
            continue;
        }

        if options.with_slide_number {
            content.push_str(&render_template(&options.slide_number_template, number));
            content.push('\n');
        }
        content.push_str(&text);
        content.push('\n');
        if options.with_end_of_slide_marker {
            content.push_str(&render_template(&options.end_of_slide_marker_template, number));
            content.push('\n');
        }
    }

    Ok(content.trim().to_string())
}

fn read_part<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut xml = String::new();
    file.read_to_string(&mut xml).ok()?;
    Some(xml)
}

/// Package-relative targets are resolved against `ppt/`
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target),
    }
}

fn xml_error(file_name: &str, err: impl std::fmt::Display) -> Error {
    Error::decode(file_name, format!("invalid XML: {}", err))
}

fn attribute(file_name: &str, element: &BytesStart<'_>, local_name: &[u8], prefixed: bool) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| xml_error(file_name, e))?;
        if attr.key.local_name().as_ref() == local_name && attr.key.prefix().is_some() == prefixed {
            let value = attr.unescape_value().map_err(|e| xml_error(file_name, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Relationship ids of `p:sldId` entries, in presentation order
fn parse_slide_ids(file_name: &str, xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(file_name, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                if let Some(id) = attribute(file_name, &e, b"id", true)? {
                    ids.push(id);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ids)
}

/// Relationship id to target path
fn parse_relationships(file_name: &str, xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(file_name, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(file_name, &e, b"Id", false)?;
                let target = attribute(file_name, &e, b"Target", false)?;
                if let (Some(id), Some(target)) = (id, target) {
                    relationships.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(relationships)
}

/// Collect `a:t` runs in document order and the root `show` flag.
/// A slide without `show` is visible; `show="0"` hides it.
fn parse_slide(file_name: &str, xml: &str) -> Result<Slide> {
    let mut reader = Reader::from_str(xml);
    let mut slide = Slide::default();
    let mut seen_root = false;
    let mut in_text = false;
    let mut current = String::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(file_name, e))? {
            Event::Start(e) => {
                if !seen_root {
                    seen_root = true;
                    slide.hidden = is_hidden(file_name, &e)?;
                }
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                    current.clear();
                }
            }
            Event::Empty(e) => {
                if !seen_root {
                    seen_root = true;
                    slide.hidden = is_hidden(file_name, &e)?;
                }
                if e.local_name().as_ref() == b"t" {
                    slide.runs.push(String::new());
                }
            }
            Event::Text(e) if in_text => {
                let text = e.unescape().map_err(|e| xml_error(file_name, e))?;
                current.push_str(&text);
            }
            Event::CData(e) if in_text => {
                current.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(e) if in_text && e.local_name().as_ref() == b"t" => {
                slide.runs.push(std::mem::take(&mut current));
                in_text = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(slide)
}

fn is_hidden(file_name: &str, root: &BytesStart<'_>) -> Result<bool> {
    let show = attribute(file_name, root, b"show", false)?;
    Ok(matches!(show.as_deref(), Some("0") | Some("false")))
}

/// PowerPoint extractor; legacy .ppt goes through LibreOffice first
pub struct PowerPointExtractor {
    options: PowerPointOptions,
    converter: LegacyConverter,
}

impl PowerPointExtractor {
    pub fn new(options: PowerPointOptions, converter: LegacyConverter) -> Self {
        Self { options, converter }
    }
}

#[async_trait]
impl TextExtractor for PowerPointExtractor {
    fn name(&self) -> &str {
        "powerpoint"
    }

    fn mime_types(&self) -> &[&'static str] {
        &[mime::MS_POWERPOINT, mime::MS_POWERPOINT_X]
    }

    async fn extract(&self, input: ExtractionInput, cancel: &CancelToken) -> Result<String> {
        let data = if mime::is_legacy_office(&input.mime_type) {
            self.converter.convert(&input, cancel).await?
        } else {
            input.data.to_vec()
        };

        cancel.check()?;
        let options = self.options.clone();
        let file_name = input.file_name;
        tokio::task::spawn_blocking(move || decode_pptx(&file_name, &data, &options))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}
