//! Ollama text generation over `/api/generate` (NDJSON stream)

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::llm::{retry_request, TextGenerationOptions, TextGenerator, TokenStream};
use super::stream::lines;
use crate::config::LlmConfig;
use crate::error::{Error, Result};

const SERVICE: &str = "ollama";

/// Streaming Ollama client
pub struct OllamaGenerator {
    client: Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one NDJSON line; `Ok(None)` marks the final chunk
fn parse_chunk(line: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(line)
        .map_err(|e| Error::remote(SERVICE, format!("Invalid stream chunk: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(Error::remote(SERVICE, error));
    }
    if chunk.done && chunk.response.is_empty() {
        return Ok(None);
    }
    Ok(Some(chunk.response))
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate_text(&self, prompt: &str, options: &TextGenerationOptions) -> Result<TokenStream> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));

        let model = self.config.model.clone();
        let prompt = prompt.to_string();
        let options = *options;
        let client = self.client.clone();

        tracing::debug!("Generating with model: {}", model);

        let response = retry_request(self.config.max_retries, || {
            let url = url.clone();
            let model = model.clone();
            let prompt = prompt.clone();
            let client = client.clone();

            async move {
                let request = GenerateRequest {
                    model: &model,
                    prompt: &prompt,
                    stream: true,
                    options: GenerateOptions {
                        temperature: options.temperature,
                        num_predict: options.max_tokens,
                    },
                };

                let response = client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::remote(SERVICE, format!("Generation request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::remote(
                        SERVICE,
                        format!("Generation failed: HTTP {} - {}", status, body),
                    ));
                }
                Ok(response)
            }
        })
        .await?;

        let tokens = lines(response.bytes_stream(), SERVICE)
            .map(|line| line.and_then(|l| parse_chunk(&l)))
            .take_while(|chunk| futures_util::future::ready(!matches!(chunk, Ok(None))))
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(Some(token)) if token.is_empty() => None,
                    Ok(Some(token)) => Some(Ok(token)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(tokens.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
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

    #[test]
    fn test_parse_chunks() {
        assert_eq!(
            parse_chunk(r#"{"model":"llama3.1","response":"Hel","done":false}"#).unwrap(),
            Some("Hel".to_string())
        );
        assert_eq!(
            parse_chunk(r#"{"model":"llama3.1","response":"","done":true,"eval_count":12}"#).unwrap(),
            None
        );
        assert!(matches!(
            parse_chunk(r#"{"error":"model not found"}"#),
            Err(Error::RemoteService { .. })
        ));
    }

    #[test]
    fn test_request_body() {
        let request = GenerateRequest {
            model: "llama3.1",
            prompt: "hi",
            stream: true,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: Some(3000),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 3000);
    }
}
