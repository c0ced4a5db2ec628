//! Core types for the ingestion pipeline

pub mod mime;
pub mod pipeline;
pub mod tags;

pub use pipeline::{
    content_sha256, new_artifact_id, ArtifactType, DataPipeline, FileDetails, GeneratedFileDetails,
    UploadedFile,
};
pub use tags::TagCollection;
