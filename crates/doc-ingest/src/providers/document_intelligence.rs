//! Azure Document Intelligence client for PDF text recognition
//!
//! Uses the REST protocol of the `prebuilt-read` model:
//! - `POST {endpoint}/formrecognizer/documentModels/{model}:analyze` with the
//!   raw document, answered by `202 Accepted` and an `Operation-Location`
//!   header
//! - `GET {Operation-Location}` until `status` is `succeeded` or `failed`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::ocr::{AnalyzedDocument, OcrService, OcrStatus, RecognizedLine, RecognizedPage};
use crate::config::DocumentIntelligenceConfig;
use crate::error::{Error, Result};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";
const SERVICE: &str = "document-intelligence";

/// Azure Document Intelligence REST client
pub struct DocumentIntelligenceClient {
    client: Client,
    config: DocumentIntelligenceConfig,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<AnalyzedPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzedPage {
    page_number: u32,
    #[serde(default)]
    lines: Vec<AnalyzedLine>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedLine {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    code: String,
    message: String,
}

impl AnalyzeOperation {
    fn into_status(self) -> Result<OcrStatus> {
        match self.status.as_str() {
            "notStarted" | "running" => Ok(OcrStatus::Running),
            "succeeded" => {
                let result = self.analyze_result.unwrap_or(AnalyzeResult { pages: Vec::new() });
                Ok(OcrStatus::Succeeded(AnalyzedDocument {
                    pages: result
                        .pages
                        .into_iter()
                        .map(|page| RecognizedPage {
                            page_number: page.page_number,
                            lines: page
                                .lines
                                .into_iter()
                                .map(|line| RecognizedLine { content: line.content })
                                .collect(),
                        })
                        .collect(),
                }))
            }
            "failed" => Ok(OcrStatus::Failed(match self.error {
                Some(e) => format!("{}: {}", e.code, e.message),
                None => "analysis failed".to_string(),
            })),
            other => Err(Error::remote(SERVICE, format!("unexpected status '{}'", other))),
        }
    }
}

impl DocumentIntelligenceClient {
    /// Create a client; the endpoint and key must be configured
    pub fn new(config: &DocumentIntelligenceConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("ocr.api_key is required".to_string()))?;
        if config.endpoint.is_empty() {
            return Err(Error::Config("ocr.endpoint is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Analyze endpoint URL for the configured model
    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model_id,
            self.config.api_version
        )
    }
}

#[async_trait]
impl OcrService for DocumentIntelligenceClient {
    async fn submit(&self, data: Bytes) -> Result<String> {
        tracing::info!(
            "Sending {} bytes to Document Intelligence model {}",
            data.len(),
            self.config.model_id
        );

        let response = self
            .client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, format!("Analyze request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                SERVICE,
                format!("Analyze failed: HTTP {} - {}", status, body),
            ));
        }

        response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::remote(SERVICE, "response has no Operation-Location header"))
    }

    async fn poll(&self, operation: &str) -> Result<OcrStatus> {
        let response = self
            .client
            .get(operation)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, format!("Status request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                SERVICE,
                format!("Status check failed: HTTP {} - {}", status, body),
            ));
        }

        let operation: AnalyzeOperation = response
            .json()
            .await
            .map_err(|e| Error::remote(SERVICE, format!("Failed to parse status response: {}", e)))?;

        operation.into_status()
    }

    fn name(&self) -> &str {
        SERVICE
    }
}
