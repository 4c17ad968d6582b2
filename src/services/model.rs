// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Generative model client.
//!
//! A single request per call; failures surface to the caller, which records
//! them against the activity. Retrying is left to the next scheduled run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{AppError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";

/// Raw model output plus usage metadata.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

/// Text generation seam used by the orchestrator.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    /// Generate markdown for `prompt`, capped at `max_output_tokens`.
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<ModelResponse>;
}

/// Messages-API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &Config) -> Result<Self> {
        if config.model_api_key.is_empty() {
            return Err(AppError::BadRequest(
                "Model API key is required. Set MODEL_API_KEY.".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.model_timeout_secs))
            .build()
            .map_err(|e| AppError::ModelApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.model_api_base.trim_end_matches('/').to_string(),
            api_key: config.model_api_key.clone(),
            model: config.model_name.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<MessagesResponse> for ModelResponse {
    fn from(response: MessagesResponse) -> Self {
        let text = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Self {
            text,
            model: response.model,
            input_tokens: response.usage.as_ref().map(|u| u.input_tokens),
            output_tokens: response.usage.as_ref().map(|u| u.output_tokens),
            stop_reason: response.stop_reason,
        }
    }
}

#[async_trait]
impl AnalysisModel for AnthropicClient {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<ModelResponse> {
        let start = Instant::now();
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: max_output_tokens,
            temperature: 0.2,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ModelApi(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            tracing::warn!("Model rate limit hit (429)");
            return Err(AppError::ModelApi(AppError::RATE_LIMITED.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelApi(format!("HTTP {}: {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::ModelApi(format!("JSON parse error: {}", e)))?;
        let result = ModelResponse::from(parsed);

        tracing::debug!(
            model = %result.model,
            input_tokens = ?result.input_tokens,
            output_tokens = ?result.output_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model call complete"
        );

        Ok(result)
    }
}
