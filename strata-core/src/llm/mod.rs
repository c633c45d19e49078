pub mod providers;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Token usage from an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object when it supports that.
    pub json: bool,
}

impl<'a> CompletionRequest<'a> {
    pub fn text(prompt: &'a str, temperature: f64, max_tokens: u32) -> Self {
        Self {
            prompt,
            temperature,
            max_tokens,
            json: false,
        }
    }

    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Tracks cumulative LLM costs across a run.
#[allow(clippy::cast_precision_loss)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTracker {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub estimated_cost_usd: f64,
}

#[allow(clippy::cast_precision_loss)]
impl CostTracker {
    pub fn record_call(
        &mut self,
        usage: &TokenUsage,
        cost_per_1k_input: f64,
        cost_per_1k_output: f64,
    ) {
        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_requests += 1;
        self.estimated_cost_usd += (usage.input_tokens as f64 / 1000.0) * cost_per_1k_input
            + (usage.output_tokens as f64 / 1000.0) * cost_per_1k_output;
    }

    pub fn record_failure(&mut self) {
        self.failed_requests += 1;
    }

    pub fn is_over_budget(&self, budget: f64) -> bool {
        budget > 0.0 && self.estimated_cost_usd >= budget
    }
}

/// Common interface for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Run one completion and return the text with its token usage.
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(String, TokenUsage), LlmError>;

    /// Cost per 1K input tokens (USD).
    fn cost_per_1k_input(&self) -> f64;

    /// Cost per 1K output tokens (USD).
    fn cost_per_1k_output(&self) -> f64;
}

/// Strip a Markdown code fence some models wrap around JSON output.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ── Tests ───────────────────────────────────────────────────────────
