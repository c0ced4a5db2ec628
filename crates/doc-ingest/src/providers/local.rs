//! Local document store implementations

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

use super::document_store::{validate_address, validate_component, DocumentStore};

/// Filesystem store laid out as `<root>/<index>/<document_id>/<file_name>`
pub struct LocalDocumentStore {
    /// Directory to store documents
    storage_dir: PathBuf,
}

impl LocalDocumentStore {
    /// Create a new local document store
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    fn document_dir(&self, index: &str, document_id: &str) -> PathBuf {
        self.storage_dir.join(index).join(document_id)
    }

    fn file_path(&self, index: &str, document_id: &str, file_name: &str) -> Result<PathBuf> {
        validate_address(index, document_id, file_name)?;
        Ok(self.document_dir(index, document_id).join(file_name))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn write_file(&self, index: &str, document_id: &str, file_name: &str, data: Bytes) -> Result<()> {
        let path = self.file_path(index, document_id, file_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling then rename, so readers never see a partial file
        let temp_path = self
            .document_dir(index, document_id)
            .join(format!("{}.partial", file_name));
        tokio::fs::write(&temp_path, &data).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!("Stored {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes> {
        let path = self.file_path(index, document_id, file_name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::FileNotFound(format!("{}/{}/{}", index, document_id, file_name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool> {
        let path = self.file_path(index, document_id, file_name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        validate_component("index", index)?;
        validate_component("document id", document_id)?;

        let dir = self.document_dir(index, document_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.ends_with(".partial") {
                    files.push(name);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.storage_dir.exists())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryDocumentStore {
    files: DashMap<(String, String, String), Bytes>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files across all documents
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn key(index: &str, document_id: &str, file_name: &str) -> (String, String, String) {
    (index.to_string(), document_id.to_string(), file_name.to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn write_file(&self, index: &str, document_id: &str, file_name: &str, data: Bytes) -> Result<()> {
        validate_address(index, document_id, file_name)?;
        self.files.insert(key(index, document_id, file_name), data);
        Ok(())
    }

    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes> {
        self.files
            .get(&key(index, document_id, file_name))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::FileNotFound(format!("{}/{}/{}", index, document_id, file_name)))
    }

    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool> {
        Ok(self.files.contains_key(&key(index, document_id, file_name)))
    }

    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .files
            .iter()
            .filter(|entry| entry.key().0 == index && entry.key().1 == document_id)
            .map(|entry| entry.key().2.clone())
            .collect();
        files.sort();
        Ok(files)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path().to_path_buf()).unwrap();

        store
            .write_file("hr", "memotxt", "memo.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        store
            .write_file("hr", "memotxt", "memo.txt.extract.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(store.read_file("hr", "memotxt", "memo.txt").await.unwrap().as_ref(), b"hello");
        assert!(store.file_exists("hr", "memotxt", "memo.txt").await.unwrap());
        assert!(dir.path().join("hr").join("memotxt").join("memo.txt").exists());
        assert_eq!(
            store.list_files("hr", "memotxt").await.unwrap(),
            vec!["memo.txt", "memo.txt.extract.txt"]
        );
        assert!(store.list_files("hr", "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.read_file("hr", "doc", "absent.txt").await.unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
        assert!(!store.file_exists("hr", "doc", "absent.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store
            .write_file("hr", "doc", "../escape.txt", Bytes::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryDocumentStore::new();
        store
            .write_file("hr", "doc", "a.txt", Bytes::from_static(b"1"))
            .await
            .unwrap();
        store
            .write_file("hr", "doc", "a.txt", Bytes::from_static(b"2"))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read_file("hr", "doc", "a.txt").await.unwrap().as_ref(), b"2");
        assert!(matches!(
            store.read_file("hr", "doc", "b.txt").await,
            Err(Error::FileNotFound(_))
        ));
    }
}
