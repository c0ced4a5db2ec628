//! Document store provider trait for source files and derived artifacts

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Trait for artifact storage. Every blob is addressed by
/// `(index, document_id, file_name)`.
///
/// Implementations:
/// - `LocalDocumentStore`: Local filesystem
/// - `MemoryDocumentStore`: In-process map, for tests and dry runs
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a file, replacing any previous content
    async fn write_file(&self, index: &str, document_id: &str, file_name: &str, data: Bytes) -> Result<()>;

    /// Read a file; `Error::FileNotFound` when absent
    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes>;

    /// Check if a file exists
    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool>;

    /// Names of the files stored for a document, sorted
    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Reject names that would escape their directory
pub(crate) fn validate_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.contains('\0')
    {
        return Err(Error::Internal(format!("Invalid {}: '{}'", kind, value)));
    }
    Ok(())
}

pub(crate) fn validate_address(index: &str, document_id: &str, file_name: &str) -> Result<()> {
    validate_component("index", index)?;
    validate_component("document id", document_id)?;
    validate_component("file name", file_name)
}
