// Token counting for budget checks.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::config::TokenizerKind;
use crate::error::ContextError;

/// Deterministic token measure, monotonic in text length.
pub trait TokenCounter: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> usize;
}

/// BPE token count via `tiktoken-rs`.
pub struct TiktokenCounter {
    kind: TokenizerKind,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn new(kind: TokenizerKind) -> Result<Self, ContextError> {
        let bpe = match kind {
            TokenizerKind::Cl100kBase => tiktoken_rs::cl100k_base(),
            TokenizerKind::O200kBase => tiktoken_rs::o200k_base(),
            TokenizerKind::Estimate => {
                return Err(ContextError::Tokenizer(
                    "estimate is not a BPE encoding".to_string(),
                ));
            }
        }
        .map_err(|e| ContextError::Tokenizer(e.to_string()))?;
        Ok(Self { kind, bpe })
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        match self.kind {
            TokenizerKind::O200kBase => "o200k_base",
            _ => "cl100k_base",
        }
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateCounter;

impl TokenCounter for EstimateCounter {
    fn name(&self) -> &str {
        "estimate"
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Build the counter selected by `context.tokenizer`.
pub fn counter_for(kind: TokenizerKind) -> Result<Arc<dyn TokenCounter>, ContextError> {
    match kind {
        TokenizerKind::Estimate => Ok(Arc::new(EstimateCounter)),
        other => Ok(Arc::new(TiktokenCounter::new(other)?)),
    }
}
