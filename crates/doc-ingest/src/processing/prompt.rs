//! Prompt templates and generation over a token stream

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use super::CancelToken;
use crate::error::Result;
use crate::ingestion::TokenCounter;
use crate::providers::llm::{collect_tokens, TextGenerationOptions, TextGenerator};

/// Substitution point for the content in a prompt template
pub const INPUT_PLACEHOLDER: &str = "{{$input}}";

static INPUT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{\$input\}\}").expect("Invalid regex"));

/// Replace every `{{$input}}` (any case) with `input`, verbatim
pub fn fill_template(template: &str, input: &str) -> String {
    INPUT_PATTERN.replace_all(template, NoExpand(input)).into_owned()
}

/// Whether a template has somewhere to put the content
pub fn has_placeholder(template: &str) -> bool {
    INPUT_PATTERN.is_match(template)
}

/// Run one generation and accumulate the streamed tokens
pub async fn generate(
    generator: &dyn TextGenerator,
    prompt: &str,
    options: &TextGenerationOptions,
    cancel: &CancelToken,
) -> Result<String> {
    let stream = cancel.run(generator.generate_text(prompt, options)).await?;
    collect_tokens(stream, cancel).await
}

/// Text produced from some content, or the content itself when it was too
/// short to bother the model with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    pub generated: bool,
}

/// Prompt-driven generation with a minimum input length
pub struct ContentPrompt<'a> {
    pub template: &'a str,
    pub min_tokens: usize,
    pub options: TextGenerationOptions,
}

impl ContentPrompt<'_> {
    pub async fn run(
        &self,
        generator: &dyn TextGenerator,
        counter: &dyn TokenCounter,
        content: &str,
        cancel: &CancelToken,
    ) -> Result<GeneratedText> {
        let tokens = counter.count_tokens(content);
        if tokens < self.min_tokens {
            tracing::debug!("Content too short ({} < {} tokens), not generating", tokens, self.min_tokens);
            return Ok(GeneratedText {
                text: content.to_string(),
                generated: false,
            });
        }

        let prompt = fill_template(self.template, content);
        let text = generate(generator, &prompt, &self.options, cancel).await?;
        Ok(GeneratedText { text, generated: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::WordCounter;
    use crate::providers::llm::tests::ScriptedGenerator;

    #[test]
    fn test_fill_template() {
        assert_eq!(fill_template("Summarize: {{$input}}", "abc"), "Summarize: abc");
        assert_eq!(fill_template("{{$INPUT}} / {{$Input}}", "x"), "x / x");
        // Content is inserted verbatim, `$` included
        assert_eq!(fill_template("[{{$input}}]", "cost $1 ${name}"), "[cost $1 ${name}]");
        assert!(has_placeholder("Content: {{$input}}"));
        assert!(!has_placeholder("Content: {input}"));
    }

    #[tokio::test]
    async fn test_generate_accumulates_stream() {
        let generator = ScriptedGenerator::new(vec![Ok("one two three".to_string())]);
        let text = generate(
            &generator,
            "prompt",
            &TextGenerationOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(text, "one two three");
    }

    #[tokio::test]
    async fn test_short_content_skips_generation() {
        let generator = ScriptedGenerator::new(vec![]);
        let prompt = ContentPrompt {
            template: "Tags: {{$input}}",
            min_tokens: 5,
            options: TextGenerationOptions::default(),
        };
        let result = prompt
            .run(&generator, &WordCounter, "too short", &CancelToken::new())
            .await
            .unwrap();
        assert!(!result.generated);
        assert_eq!(result.text, "too short");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_long_content_fills_prompt() {
        let generator = ScriptedGenerator::new(vec![Ok("Acme".to_string())]);
        let prompt = ContentPrompt {
            template: "Tags: {{$input}}",
            min_tokens: 2,
            options: TextGenerationOptions {
                temperature: 0.0,
                max_tokens: Some(200),
            },
        };
        let result = prompt
            .run(&generator, &WordCounter, "a b c", &CancelToken::new())
            .await
            .unwrap();
        assert!(result.generated);
        assert_eq!(result.text, "Acme");
        let prompts = generator.prompts.lock();
        assert_eq!(prompts[0].0, "Tags: a b c");
        assert_eq!(prompts[0].1.max_tokens, Some(200));
    }
}
