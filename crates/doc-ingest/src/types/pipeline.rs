//! Pipeline state: one document under ingestion, its source files and
//! everything derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::tags::TagCollection;

/// Classification of a derived artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Undefined,
    ExtractedText,
    ExtractedContent,
    TextPartition,
    EmbeddingVector,
    SyntheticData,
}

/// Fresh opaque identifier (32 lowercase hex chars, no dashes)
pub fn new_artifact_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Lowercase hex SHA-256 of an artifact payload
pub fn content_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A file derived from an uploaded file by some handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFileDetails {
    pub id: String,
    /// Id of the owning source file
    pub parent_id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub artifact_type: ArtifactType,
    #[serde(default)]
    pub tags: TagCollection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    #[serde(default)]
    pub processed_by: BTreeSet<String>,
}

impl GeneratedFileDetails {
    /// Describe a text artifact of `content`, hashing its UTF-8 bytes
    pub fn text(
        parent_id: &str,
        name: impl Into<String>,
        mime_type: &str,
        artifact_type: ArtifactType,
        content: &str,
        tags: TagCollection,
    ) -> Self {
        Self {
            id: new_artifact_id(),
            parent_id: parent_id.to_string(),
            name: name.into(),
            size: content.chars().count() as u64,
            mime_type: mime_type.to_string(),
            artifact_type,
            tags,
            content_sha256: Some(content_sha256(content.as_bytes())),
            processed_by: BTreeSet::new(),
        }
    }

    pub fn already_processed_by(&self, step_name: &str) -> bool {
        self.processed_by.contains(step_name)
    }

    pub fn mark_processed_by(&mut self, step_name: &str) {
        self.processed_by.insert(step_name.to_string());
    }

    /// Check a stored payload against the recorded digest
    pub fn verify_content(&self, data: &[u8]) -> bool {
        self.content_sha256
            .as_deref()
            .map_or(true, |expected| expected == content_sha256(data))
    }
}

/// An uploaded source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetails {
    pub id: String,
    pub name: String,
    pub size: u64,
    mime_type: String,
    /// Derived artifacts keyed by file name; only ever grows
    #[serde(default)]
    generated_files: BTreeMap<String, GeneratedFileDetails>,
    #[serde(default)]
    pub processed_by: BTreeSet<String>,
}

impl FileDetails {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            generated_files: BTreeMap::new(),
            processed_by: BTreeSet::new(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn already_processed_by(&self, step_name: &str) -> bool {
        self.processed_by.contains(step_name)
    }

    pub fn mark_processed_by(&mut self, step_name: &str) {
        self.processed_by.insert(step_name.to_string());
    }

    pub fn generated_files(&self) -> &BTreeMap<String, GeneratedFileDetails> {
        &self.generated_files
    }

    pub fn generated_file(&self, name: &str) -> Option<&GeneratedFileDetails> {
        self.generated_files.get(name)
    }

    pub fn generated_file_mut(&mut self, name: &str) -> Option<&mut GeneratedFileDetails> {
        self.generated_files.get_mut(name)
    }

    /// Record a derived artifact. A re-derived artifact with the same name
    /// replaces the previous metadata; nothing is ever removed.
    pub fn add_generated_file(&mut self, details: GeneratedFileDetails) {
        self.generated_files.insert(details.name.clone(), details);
    }

    /// Names of generated files of the given type, in name order
    pub fn generated_names_of(&self, artifact_type: ArtifactType) -> Vec<String> {
        self.generated_files
            .values()
            .filter(|f| f.artifact_type == artifact_type)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Deterministic output name for a handler writing into this file's artifacts
    pub fn handler_output_file_name(&self, step_name: &str, index: usize) -> String {
        format!("{}.{}.{}.txt", self.name, step_name, index)
    }
}

/// Source bytes waiting to be written to the document store
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_id: String,
    pub name: String,
    pub bytes: bytes::Bytes,
}

/// One document's ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPipeline {
    pub index: String,
    pub document_id: String,
    /// Every step of the run, fixed at creation
    steps: Vec<String>,
    remaining_steps: Vec<String>,
    completed_steps: Vec<String>,
    pub tags: TagCollection,
    pub files: Vec<FileDetails>,
    pub creation: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip)]
    files_to_upload: Vec<UploadedFile>,
}

impl DataPipeline {
    pub fn new(
        index: impl Into<String>,
        document_id: impl Into<String>,
        tags: TagCollection,
        steps: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            index: index.into(),
            document_id: document_id.into(),
            remaining_steps: steps.clone(),
            steps,
            completed_steps: Vec::new(),
            tags,
            files: Vec::new(),
            creation: now,
            last_update: now,
            files_to_upload: Vec::new(),
        }
    }

    /// Document id used by the blob trigger: the file name without dots
    pub fn document_id_from_file_name(file_name: &str) -> String {
        file_name.replace('.', "")
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn remaining_steps(&self) -> &[String] {
        &self.remaining_steps
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_steps.is_empty()
    }

    /// Attach source bytes; metadata is recorded now, bytes are written on run
    pub fn add_upload_file(&mut self, file_id: impl Into<String>, name: impl Into<String>, bytes: impl Into<bytes::Bytes>) {
        let file_id = file_id.into();
        let name = name.into();
        let bytes = bytes.into();
        let mime_type = super::mime::from_file_name(&name);

        self.files.push(FileDetails::new(
            new_artifact_id(),
            name.clone(),
            bytes.len() as u64,
            mime_type,
        ));
        self.files_to_upload.push(UploadedFile { file_id, name, bytes });
    }

    /// Source files whose bytes are not in the store yet
    pub fn pending_uploads(&self) -> usize {
        self.files_to_upload.len()
    }

    pub(crate) fn next_file_to_upload(&mut self) -> Option<UploadedFile> {
        if self.files_to_upload.is_empty() {
            None
        } else {
            Some(self.files_to_upload.remove(0))
        }
    }

    /// Put back an upload that could not be written, ahead of the rest
    pub(crate) fn requeue_upload(&mut self, upload: UploadedFile) {
        self.files_to_upload.insert(0, upload);
    }

    /// Move the head step to the completed list
    pub(crate) fn complete_current_step(&mut self) -> Option<String> {
        if self.remaining_steps.is_empty() {
            return None;
        }
        let step = self.remaining_steps.remove(0);
        self.completed_steps.push(step.clone());
        self.last_update = Utc::now();
        Some(step)
    }

    pub(crate) fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// Find a source file by name
    pub fn file(&self, name: &str) -> Option<&FileDetails> {
        self.files.iter().find(|f| f.name == name)
    }
}
