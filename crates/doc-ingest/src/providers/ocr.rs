//! OCR service abstraction and the submit/poll state machine
//!
//! Document analysis is asynchronous on the server side: the document is
//! submitted, then its operation is polled until it succeeds or fails.
//! [`analyze_to_completion`] drives that cycle with a caller-supplied
//! timeout and stops at the next suspension point when cancelled.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::processing::CancelToken;

/// One recognized line of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub content: String,
}

/// Recognized lines of one page, in reading order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedPage {
    pub page_number: u32,
    pub lines: Vec<RecognizedLine>,
}

/// Result of a completed analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    pub pages: Vec<RecognizedPage>,
}

impl AnalyzedDocument {
    /// Every line of every page, each terminated by `\r\n`
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for line in self.pages.iter().flat_map(|page| &page.lines) {
            text.push_str(&line.content);
            text.push_str("\r\n");
        }
        text
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|page| page.lines.len()).sum()
    }
}

/// Server-side status of a submitted analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrStatus {
    Running,
    Succeeded(AnalyzedDocument),
    Failed(String),
}

/// Trait for remote document analysis
///
/// Implementations:
/// - `DocumentIntelligenceClient`: Azure Document Intelligence REST API
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Submit document bytes; returns an opaque operation handle
    async fn submit(&self, data: Bytes) -> Result<String>;

    /// Query the status of a submitted operation
    async fn poll(&self, operation: &str) -> Result<OcrStatus>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Timing policy for one analysis
#[derive(Debug, Clone, Copy)]
pub struct OcrPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for OcrPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Client-side view of one analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOperation {
    Submitted { operation: String },
    Polling { operation: String, attempts: u32 },
    Completed(AnalyzedDocument),
    Failed(String),
}

impl OcrOperation {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// Move one step forward. Polling waits `poll_interval` before asking
    /// again; terminal states are returned unchanged.
    pub async fn advance(self, service: &dyn OcrService, poll_interval: Duration) -> Result<Self> {
        let (operation, attempts) = match self {
            Self::Submitted { operation } => (operation, 0),
            Self::Polling { operation, attempts } => {
                tokio::time::sleep(poll_interval).await;
                (operation, attempts)
            }
            terminal => return Ok(terminal),
        };

        Ok(match service.poll(&operation).await? {
            OcrStatus::Running => Self::Polling {
                operation,
                attempts: attempts + 1,
            },
            OcrStatus::Succeeded(document) => Self::Completed(document),
            OcrStatus::Failed(message) => Self::Failed(message),
        })
    }
}

/// Submit `data` and poll until the analysis completes, fails, times out or
/// is cancelled
pub async fn analyze_to_completion(
    service: &dyn OcrService,
    data: Bytes,
    policy: OcrPolicy,
    cancel: &CancelToken,
) -> Result<AnalyzedDocument> {
    let analysis = async {
        let operation = service.submit(data).await?;
        tracing::debug!("{} accepted analysis {}", service.name(), operation);

        let mut state = OcrOperation::Submitted { operation };
        while !state.is_terminal() {
            state = state.advance(service, policy.poll_interval).await?;
        }

        match state {
            OcrOperation::Completed(document) => Ok(document),
            OcrOperation::Failed(message) => Err(Error::remote(service.name(), message)),
            _ => Err(Error::internal("OCR operation left polling without a result")),
        }
    };

    cancel
        .run(async {
            tokio::time::timeout(policy.timeout, analysis)
                .await
                .map_err(|_| Error::Timeout(policy.timeout))?
        })
        .await
}
