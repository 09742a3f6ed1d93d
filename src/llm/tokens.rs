use tiktoken_rs::CoreBPE;
use tracing::warn;

use super::error::ConfigError;

/// Estimates the billed token count of a piece of text
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// BPE token counter using the target model's encoding
pub struct BpeTokenCounter {
    bpe: CoreBPE,
}

impl BpeTokenCounter {
    /// Resolve the encoding for `model`, falling back to `o200k_base` for unknown names
    pub fn for_model(model: &str) -> Result<Self, ConfigError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!("No tokenizer registered for {}: {}, using o200k_base", model, e);
                tiktoken_rs::o200k_base().map_err(|e| ConfigError::Tokenizer {
                    model: model.to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpe_counts_tokens() {
        let counter = BpeTokenCounter::for_model("gpt-4o-mini").unwrap();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("hello world"), 2);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let counter = BpeTokenCounter::for_model("not-a-real-model").unwrap();
        assert!(counter.count_tokens("The effect was significant (p = 0.03).") > 5);
    }
}
