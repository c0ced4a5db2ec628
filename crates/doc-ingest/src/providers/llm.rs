//! Text generation provider trait
//!
//! Generation is streamed: [`TextGenerator::generate_text`] returns a lazy,
//! finite sequence of text fragments. Dropping the stream closes the
//! underlying connection.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Result;
use crate::processing::CancelToken;

/// Streamed generation output
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Sampling options for one generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextGenerationOptions {
    pub temperature: f32,
    /// Upper bound on generated tokens; backend default when `None`
    pub max_tokens: Option<u32>,
}

impl Default for TextGenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Trait for streamed text generation
///
/// Implementations:
/// - `OllamaGenerator`: Local Ollama server
/// - `AzureOpenAiGenerator`: Azure OpenAI chat completions deployment
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a generation and return its token stream
    async fn generate_text(&self, prompt: &str, options: &TextGenerationOptions) -> Result<TokenStream>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}

/// Accumulate a token stream into one string. Cancellation drops the
/// stream, closing its connection.
pub async fn collect_tokens(stream: TokenStream, cancel: &CancelToken) -> Result<String> {
    cancel
        .run(async move {
            let mut stream = stream;
            let mut content = String::new();
            while let Some(token) = stream.next().await {
                content.push_str(&token?);
            }
            Ok(content)
        })
        .await
}

/// Retry a request with exponential backoff. Only transient failures are
/// retried.
pub(crate) async fn retry_request<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && e.is_transient() && !e.is_cancelled() => {
                let delay = Duration::from_secs(2u64.pow(attempt));
                tracing::warn!(
                    "Request failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    max_retries + 1,
                    delay,
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
