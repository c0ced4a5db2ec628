//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ingestion::{ExcelOptions, LegacyConversionConfig, PowerPointOptions};
use crate::processing::{prompt::has_placeholder, steps};
use crate::types::TagCollection;

/// Prefix of the environment variables read by [`IngestConfig::apply_env_overrides`]
pub const ENV_PREFIX: &str = "DOC_INGEST_";

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Pipeline defaults used by the trigger
    pub pipeline: PipelineConfig,
    /// Artifact storage
    pub storage: StorageConfig,
    /// Remote OCR service for PDFs
    pub ocr: DocumentIntelligenceConfig,
    /// Text generation backend
    pub llm: LlmConfig,
    /// Format extractor options
    pub extraction: ExtractionConfig,
    /// Summary generation
    pub summarization: SummarizationConfig,
    /// Tag generation
    pub tagging: TaggingConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text; missing sections take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `DOC_INGEST_*` variables onto the loaded values.
    ///
    /// Only the binary calls this; library code never reads the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("INDEX") {
            self.pipeline.index = v;
        }
        if let Some(v) = lookup("STORAGE_DIR") {
            self.storage.root_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OCR_ENDPOINT") {
            self.ocr.endpoint = v;
        }
        if let Some(v) = lookup("OCR_API_KEY") {
            self.ocr.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_BACKEND") {
            match v.to_lowercase().as_str() {
                "ollama" => self.llm.backend = LlmBackend::Ollama,
                "azure_openai" | "azure-openai" => self.llm.backend = LlmBackend::AzureOpenai,
                other => tracing::warn!("Ignoring unknown LLM backend override: {}", other),
            }
        }
        if let Some(v) = lookup("LLM_ENDPOINT") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.index.trim().is_empty() {
            return Err(Error::Config("pipeline.index must not be empty".to_string()));
        }
        if self.pipeline.steps.is_empty() {
            return Err(Error::Config("pipeline.steps must name at least one step".to_string()));
        }
        if !has_placeholder(&self.summarization.prompt) {
            return Err(Error::Config(
                "summarization.prompt must contain the {{$input}} placeholder".to_string(),
            ));
        }
        if !has_placeholder(&self.tagging.prompt) {
            return Err(Error::Config(
                "tagging.prompt must contain the {{$input}} placeholder".to_string(),
            ));
        }
        if self.tagging.tag_key.trim().is_empty() {
            return Err(Error::Config("tagging.tag_key must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Pipeline defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target collection name
    pub index: String,
    /// Tags attached to every new pipeline
    pub tags: TagCollection,
    /// Ordered step list for new pipelines
    pub steps: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index: "default".to_string(),
            tags: TagCollection::new(),
            steps: vec![
                steps::DOCUMENT_INTELLIGENCE.to_string(),
                steps::SUMMARIZE.to_string(),
                steps::GENERATE_TAGS.to_string(),
            ],
        }
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; artifacts live under `<root>/<index>/<document_id>/`
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data/documents"),
        }
    }
}

/// Azure Document Intelligence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIntelligenceConfig {
    /// Service endpoint, e.g. `https://<resource>.cognitiveservices.azure.com`
    #[serde(default)]
    pub endpoint: String,
    /// Subscription key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Analysis model (default: prebuilt-read)
    #[serde(default = "default_ocr_model")]
    pub model_id: String,
    #[serde(default = "default_ocr_api_version")]
    pub api_version: String,
    /// Delay between status polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up on one analysis after this many seconds
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

fn default_ocr_model() -> String { "prebuilt-read".to_string() }
fn default_ocr_api_version() -> String { "2023-07-31".to_string() }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_ocr_timeout() -> u64 { 300 }

impl Default for DocumentIntelligenceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            model_id: default_ocr_model(),
            api_version: default_ocr_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

impl DocumentIntelligenceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether enough is configured to reach the service
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && self.api_key.is_some()
    }
}

/// Text generation backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Azure OpenAI chat completions deployment
    AzureOpenai,
}

/// Text generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: LlmBackend,
    /// Ollama base URL or Azure OpenAI endpoint
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    /// Azure OpenAI key (unused by Ollama)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Ollama model name or Azure OpenAI deployment name
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Azure OpenAI API version
    #[serde(default = "default_llm_api_version")]
    pub api_version: String,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Retries for the initial request (the stream itself is not retried)
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_llm_url() -> String { "http://localhost:11434".to_string() }
fn default_llm_model() -> String { "llama3.1".to_string() }
fn default_llm_api_version() -> String { "2024-02-01".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_llm_retries() -> u32 { 2 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            base_url: default_llm_url(),
            api_key: None,
            model: default_llm_model(),
            api_version: default_llm_api_version(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Format extractor options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub powerpoint: PowerPointOptions,
    pub excel: ExcelOptions,
    pub legacy: LegacyConversionConfig,
}

/// Summary generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Prompt template; `{{$input}}` receives the extracted text
    #[serde(default = "default_summary_prompt")]
    pub prompt: String,
    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,
    /// Leading label removed from the generated summary
    #[serde(default = "default_summary_label")]
    pub strip_label: String,
    /// Content under this many tokens is not summarized
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
}

fn default_summary_prompt() -> String {
    "Summarize the following content in a few sentences. \
     Only answer with the summary, no introduction or commentary.\n\
     Summary: {{$input}}"
        .to_string()
}
fn default_summary_max_tokens() -> u32 { 3000 }
fn default_summary_label() -> String { "Summary: ".to_string() }
fn default_min_tokens() -> usize { 50 }

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            prompt: default_summary_prompt(),
            max_tokens: default_summary_max_tokens(),
            strip_label: default_summary_label(),
            min_tokens: default_min_tokens(),
        }
    }
}

/// Tag generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    /// Prompt template; `{{$input}}` receives the extracted text
    #[serde(default = "default_tagging_prompt")]
    pub prompt: String,
    /// Pipeline tag key receiving the generated values
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    /// Content under this many tokens is not tagged
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_tagging_max_tokens")]
    pub max_tokens: u32,
}

fn default_tagging_prompt() -> String {
    "Extract only the contract name from the content. No sentences or other information.\n\
     If several contracts are mentioned, separate their names with commas.\n\
     Content: {{$input}}"
        .to_string()
}
fn default_tag_key() -> String { "Contract".to_string() }
fn default_tagging_max_tokens() -> u32 { 200 }

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            prompt: default_tagging_prompt(),
            tag_key: default_tag_key(),
            min_tokens: default_min_tokens(),
            max_tokens: default_tagging_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ocr.model_id, "prebuilt-read");
        assert_eq!(config.summarization.max_tokens, 3000);
        assert_eq!(config.tagging.tag_key, "Contract");
        assert_eq!(config.pipeline.steps[0], steps::DOCUMENT_INTELLIGENCE);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            [pipeline]
            index = "contracts"
            tags = { Theme = ["Book RH"] }

            [llm]
            backend = "azure_openai"
            base_url = "https://example.openai.azure.com"
            model = "gpt-4o"

            [extraction.powerpoint]
            with_slide_number = true
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.index, "contracts");
        assert!(config.pipeline.tags.contains("Theme", "Book RH"));
        assert_eq!(config.llm.backend, LlmBackend::AzureOpenai);
        assert_eq!(config.llm.api_version, "2024-02-01");
        assert!(config.extraction.powerpoint.with_slide_number);
        assert!(config.extraction.powerpoint.skip_hidden_slides);
        assert_eq!(config.tagging.min_tokens, 50);
    }

    #[test]
    fn test_prompt_without_placeholder_is_rejected() {
        let err = IngestConfig::from_toml_str(
            r#"
            [summarization]
            prompt = "Summarize this"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INDEX", "hr"),
            ("OCR_ENDPOINT", "https://ocr.example.com"),
            ("OCR_API_KEY", "secret"),
            ("LLM_BACKEND", "azure-openai"),
        ]
        .into_iter()
        .collect();

        let mut config = IngestConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.pipeline.index, "hr");
        assert!(config.ocr.is_configured());
        assert_eq!(config.llm.backend, LlmBackend::AzureOpenai);
        assert_eq!(config.llm.model, "llama3.1");
    }
}
