//! Token counting for the minimum-length checks

use tiktoken_rs::{o200k_base, CoreBPE};

use crate::error::{Error, Result};

/// Counts model tokens in a text
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// GPT-4o tokenizer (o200k_base encoding)
pub struct O200kTokenCounter {
    bpe: CoreBPE,
}

impl O200kTokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = o200k_base().map_err(|e| Error::Internal(format!("Failed to load tokenizer: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for O200kTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Whitespace word count; a cheap stand-in where exact counts do not matter
#[derive(Debug, Default, Clone, Copy)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
