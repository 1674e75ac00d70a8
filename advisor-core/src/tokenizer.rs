//! Token counting for the context budget.
//!
//! `HfTokenCounter` wraps a HuggingFace `tokenizer.json`; when no tokenizer is
//! configured (or it fails to load) the whitespace `WordCounter` is used.

use std::path::Path;
use std::sync::Arc;

/// Text in, token count out.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Counter name for logging.
    fn name(&self) -> &str;
}

/// Approximates tokens by whitespace-delimited words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "word-count"
    }
}

pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

impl std::fmt::Debug for HfTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenCounter").finish_non_exhaustive()
    }
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err(format!("tokenizer not found at {}", path.display()));
        }
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| e.to_string())?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                tracing::debug!(error = %e, "Tokenizer encode failed, counting words");
                WordCounter.count(text)
            }
        }
    }

    fn name(&self) -> &str {
        "hf-tokenizer"
    }
}

/// Build the configured counter. An empty path or a load failure yields `WordCounter`.
pub fn load_token_counter(tokenizer_path: &str) -> Arc<dyn TokenCounter> {
    if tokenizer_path.is_empty() {
        return Arc::new(WordCounter);
    }

    let path = crate::config::expand_path(tokenizer_path);
    match HfTokenCounter::from_file(&path) {
        Ok(counter) => {
            tracing::info!(path = %path.display(), "Loaded tokenizer for context budget");
            Arc::new(counter)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Tokenizer unavailable, approximating tokens by word count");
            Arc::new(WordCounter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counter() {
        assert_eq!(WordCounter.count(""), 0);
        assert_eq!(WordCounter.count("   "), 0);
        assert_eq!(WordCounter.count("one two\tthree\nfour"), 4);
    }

    #[test]
    fn test_missing_tokenizer_falls_back_to_words() {
        let counter = load_token_counter("/nonexistent/tokenizer.json");
        assert_eq!(counter.name(), "word-count");
        assert_eq!(counter.count("a b c"), 3);
    }

    #[test]
    fn test_empty_path_is_word_counter() {
        assert_eq!(load_token_counter("").name(), "word-count");
    }
}
