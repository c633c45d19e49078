// LLM provider implementations: OpenAI-compatible chat completions and
// Anthropic messages.
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSection;
use crate::error::LlmError;

use super::{CompletionRequest, LlmProvider, TokenUsage};

/// POST `body` and decode a success response as `R`.
async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<R, LlmError> {
    let resp = request
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::ApiError { status, body });
    }

    resp.json().await.map_err(|e| LlmError::Parse(e.to_string()))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// ── OpenAI-compatible Provider ──────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(String, TokenUsage), LlmError> {
        let body = OpenAiRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            response_format: request.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, json = request.json, "Calling OpenAI API");

        let http = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let result: OpenAiResponse = post_json(http, &body).await?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response has no message content".to_string()))?;

        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.prompt_tokens,
                output_tokens: result.usage.completion_tokens,
            },
        ))
    }

    fn cost_per_1k_input(&self) -> f64 {
        if self.model.contains("gpt-4o-mini") {
            0.000_15
        } else if self.model.contains("gpt-4o") {
            0.0025
        } else if self.model.contains("gpt-4") {
            0.03
        } else {
            0.0015
        }
    }

    fn cost_per_1k_output(&self) -> f64 {
        if self.model.contains("gpt-4o-mini") {
            0.000_6
        } else if self.model.contains("gpt-4o") {
            0.01
        } else if self.model.contains("gpt-4") {
            0.06
        } else {
            0.002
        }
    }
}

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(String, TokenUsage), LlmError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let http = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let result: AnthropicResponse = post_json(http, &body).await?;

        let text: String = result.content.into_iter().map(|c| c.text).collect();
        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
            },
        ))
    }

    fn cost_per_1k_input(&self) -> f64 {
        if self.model.contains("opus") {
            0.015
        } else if self.model.contains("haiku") {
            0.00025
        } else {
            0.003
        }
    }

    fn cost_per_1k_output(&self) -> f64 {
        if self.model.contains("opus") {
            0.075
        } else if self.model.contains("haiku") {
            0.00125
        } else {
            0.015
        }
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create a provider from the `[llm]` section, reading the API key from the
/// configured environment variable.
pub fn create_provider(section: &LlmSection) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = std::env::var(&section.api_key_env).map_err(|_| {
        LlmError::Config(format!(
            "environment variable {} is not set",
            section.api_key_env
        ))
    })?;
    build_provider(
        &section.provider,
        &section.model,
        api_key,
        section.base_url.as_deref(),
    )
}

/// Create a provider by name with an explicit key.
pub fn build_provider(
    provider: &str,
    model: &str,
    api_key: String,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match provider {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key, model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Arc::new(p))
        }
        "openai" | "custom" => {
            let mut p = OpenAiProvider::new(api_key, model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Arc::new(p))
        }
        other => Err(LlmError::Config(format!(
            "Unknown provider: {other}. Use: anthropic, openai, custom"
        ))),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
