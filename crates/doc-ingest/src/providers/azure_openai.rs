//! Azure OpenAI chat completions (server-sent events stream)

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::llm::{retry_request, TextGenerationOptions, TextGenerator, TokenStream};
use super::stream::{lines, sse_data, SSE_DONE};
use crate::config::LlmConfig;
use crate::error::{Error, Result};

const SERVICE: &str = "azure-openai";
const API_KEY_HEADER: &str = "api-key";

/// Streaming client for one Azure OpenAI deployment
pub struct AzureOpenAiGenerator {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// What one SSE line contributes to the generation
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Token(String),
    Skip,
    Done,
}

fn parse_event(line: &str) -> Result<SseEvent> {
    let Some(data) = sse_data(line) else {
        return Ok(SseEvent::Skip);
    };
    if data == SSE_DONE {
        return Ok(SseEvent::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| Error::remote(SERVICE, format!("Invalid stream chunk: {}", e)))?;
    let content: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.and_then(|d| d.content))
        .collect();

    if content.is_empty() {
        Ok(SseEvent::Skip)
    } else {
        Ok(SseEvent::Token(content))
    }
}

impl AzureOpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("llm.api_key is required for Azure OpenAI".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_version
        )
    }
}

#[async_trait]
impl TextGenerator for AzureOpenAiGenerator {
    async fn generate_text(&self, prompt: &str, options: &TextGenerationOptions) -> Result<TokenStream> {
        let url = self.completions_url();
        let prompt = prompt.to_string();
        let options = *options;
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        tracing::debug!("Generating with deployment: {}", self.config.model);

        let response = retry_request(self.config.max_retries, || {
            let url = url.clone();
            let prompt = prompt.clone();
            let client = client.clone();
            let api_key = api_key.clone();

            async move {
                let request = ChatRequest {
                    messages: [ChatMessage {
                        role: "user",
                        content: &prompt,
                    }],
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                    stream: true,
                };

                let response = client
                    .post(&url)
                    .header(API_KEY_HEADER, api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::remote(SERVICE, format!("Completion request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::remote(
                        SERVICE,
                        format!("Completion failed: HTTP {} - {}", status, body),
                    ));
                }
                Ok(response)
            }
        })
        .await?;

        let tokens = lines(response.bytes_stream(), SERVICE)
            .map(|line| line.and_then(|l| parse_event(&l)))
            .take_while(|event| futures_util::future::ready(!matches!(event, Ok(SseEvent::Done))))
            .filter_map(|event| async move {
                match event {
                    Ok(SseEvent::Token(token)) => Some(Ok(token)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(tokens.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        // No cheap status endpoint per deployment; report whether it is configured
        Ok(!self.config.base_url.is_empty() && !self.api_key.is_empty())
    }

    fn name(&self) -> &str {
        SERVICE
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmBackend;

    fn config() -> LlmConfig {
        LlmConfig {
            backend: LlmBackend::AzureOpenai,
            base_url: "https://example.openai.azure.com/".to_string(),
            api_key: Some("key".to_string()),
            model: "gpt-4o".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_completions_url() {
        let generator = AzureOpenAiGenerator::new(&config()).unwrap();
        assert_eq!(
            generator.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_event(r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#).unwrap(),
            SseEvent::Token("Hel".to_string())
        );
        assert_eq!(
            parse_event(r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseEvent::Skip
        );
        assert_eq!(parse_event(r#"data: {"choices":[]}"#).unwrap(), SseEvent::Skip);
        assert_eq!(parse_event("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_event(": ping").unwrap(), SseEvent::Skip);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let mut config = config();
        config.api_key = None;
        assert!(matches!(AzureOpenAiGenerator::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_body() {
        let request = ChatRequest {
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.0,
            max_tokens: None,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }
}
