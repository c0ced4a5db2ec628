//! Conversion of pre-OOXML Office files through headless LibreOffice

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;

use super::ExtractionInput;
use crate::error::{Error, Result};
use crate::processing::CancelToken;
use crate::types::mime;

/// LibreOffice conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConversionConfig {
    /// Convert `.doc`/`.ppt` before decoding
    pub enabled: bool,
    /// LibreOffice executable
    pub binary: String,
    /// Kill the conversion after this many seconds
    pub timeout_secs: u64,
}

impl Default for LegacyConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "soffice".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Runs `soffice --headless --convert-to` in a scratch directory
#[derive(Debug, Clone)]
pub struct LegacyConverter {
    config: LegacyConversionConfig,
}

impl LegacyConverter {
    pub fn new(config: LegacyConversionConfig) -> Self {
        Self { config }
    }

    /// Source and target extensions for a legacy MIME type
    pub fn extensions(mime_type: &str) -> Option<(&'static str, &'static str)> {
        match mime_type {
            mime::MS_WORD => Some(("doc", "docx")),
            mime::MS_POWERPOINT => Some(("ppt", "pptx")),
            _ => None,
        }
    }

    /// Convert legacy bytes to their OOXML equivalent
    pub async fn convert(&self, input: &ExtractionInput, cancel: &CancelToken) -> Result<Vec<u8>> {
        if !self.config.enabled {
            return Err(Error::decode(
                &input.file_name,
                "legacy Office conversion is disabled",
            ));
        }

        let (source_ext, target_ext) = Self::extensions(&input.mime_type).ok_or_else(|| {
            Error::UnsupportedFormat(format!("{} cannot be converted", input.mime_type))
        })?;

        let temp_dir = tempfile::tempdir()?;
        let input_path = temp_dir.path().join(format!("source.{}", source_ext));
        let output_path = temp_dir.path().join(format!("source.{}", target_ext));
        tokio::fs::write(&input_path, &input.data).await?;

        tracing::debug!(
            "[{}] Converting {} to {} with {}",
            input.file_name,
            source_ext,
            target_ext,
            self.config.binary
        );

        let mut command = Command::new(&self.config.binary);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg(target_ext)
            .arg("--outdir")
            .arg(temp_dir.path())
            .arg(&input_path)
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = cancel
            .run(async {
                match tokio::time::timeout(timeout, command.output()).await {
                    Ok(output) => output.map_err(|e| {
                        Error::decode(&input.file_name, format!("LibreOffice failed to start: {}", e))
                    }),
                    Err(_) => Err(Error::Timeout(timeout)),
                }
            })
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::decode(
                &input.file_name,
                format!("LibreOffice conversion failed: {}", stderr.trim()),
            ));
        }

        tokio::fs::read(&output_path).await.map_err(|e| {
            Error::decode(
                &input.file_name,
                format!("LibreOffice produced no {} output: {}", target_ext, e),
            )
        })
    }
}
