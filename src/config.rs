// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once by the process entry point and handed to the services that
//! need it; nothing below `main` reads the environment.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default byte budget for the serialized payload sent to the model.
pub const DEFAULT_PAYLOAD_BUDGET_BYTES: usize = 500 * 1024;

/// Connection details for one classroom's LMS instance.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LmsEndpoint {
    /// Base URL of the LMS (e.g. `https://classroom1.example.edu`)
    pub base_url: String,
    /// Web service token
    pub token: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Store ---
    /// GCP project ID hosting Firestore
    pub gcp_project_id: String,

    // --- LMS ---
    /// LMS endpoints keyed by classroom id
    pub lms_endpoints: HashMap<String, LmsEndpoint>,

    // --- Model ---
    /// Model API key
    pub model_api_key: String,
    /// Model name
    pub model_name: String,
    /// Model API base URL
    pub model_api_base: String,
    /// Response size ceiling (output tokens)
    pub model_max_output_tokens: u32,
    /// Request timeout in seconds
    pub model_timeout_secs: u64,

    // --- Batch run ---
    pub page_size: u32,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub page_pause_ms: u64,
    pub payload_budget_bytes: usize,
    /// Whether forums spanning several groups get one extra analysis per group
    pub forum_group_analysis: bool,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            lms_endpoints: HashMap::new(),
            model_api_key: "test_model_key".to_string(),
            model_name: crate::services::model::DEFAULT_MODEL.to_string(),
            model_api_base: crate::services::model::DEFAULT_API_BASE.to_string(),
            model_max_output_tokens: 8192,
            model_timeout_secs: 180,
            page_size: 50,
            batch_size: 5,
            batch_pause_ms: 1000,
            page_pause_ms: 3000,
            payload_budget_bytes: DEFAULT_PAYLOAD_BUDGET_BYTES,
            forum_group_analysis: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        let lms_endpoints = env::var("LMS_ENDPOINTS")
            .map_err(|_| ConfigError::Missing("LMS_ENDPOINTS"))
            .and_then(|raw| parse_endpoints(&raw))?;

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            lms_endpoints,
            model_api_key: env::var("MODEL_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("MODEL_API_KEY"))?,
            model_name: env::var("MODEL_NAME").unwrap_or(defaults.model_name),
            model_api_base: env::var("MODEL_API_BASE").unwrap_or(defaults.model_api_base),
            model_max_output_tokens: parse_or("MODEL_MAX_OUTPUT_TOKENS", defaults.model_max_output_tokens)?,
            model_timeout_secs: parse_or("MODEL_TIMEOUT_SECS", defaults.model_timeout_secs)?,
            page_size: parse_or("ANALYSIS_PAGE_SIZE", defaults.page_size)?,
            batch_size: parse_or("ANALYSIS_BATCH_SIZE", defaults.batch_size)?,
            batch_pause_ms: parse_or("ANALYSIS_BATCH_PAUSE_MS", defaults.batch_pause_ms)?,
            page_pause_ms: parse_or("ANALYSIS_PAGE_PAUSE_MS", defaults.page_pause_ms)?,
            payload_budget_bytes: parse_or(
                "ANALYSIS_PAYLOAD_BUDGET_BYTES",
                defaults.payload_budget_bytes,
            )?,
            forum_group_analysis: parse_or("ANALYSIS_FORUM_GROUPS", defaults.forum_group_analysis)?,
        })
    }

    /// Pause between batches within a page.
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Pause between pages.
    pub fn page_pause(&self) -> Duration {
        Duration::from_millis(self.page_pause_ms)
    }
}

/// Parse the `LMS_ENDPOINTS` JSON object.
fn parse_endpoints(raw: &str) -> Result<HashMap<String, LmsEndpoint>, ConfigError> {
    let endpoints: HashMap<String, LmsEndpoint> = serde_json::from_str(raw)
        .map_err(|e| ConfigError::Invalid("LMS_ENDPOINTS", e.to_string()))?;
    if endpoints.is_empty() {
        return Err(ConfigError::Invalid(
            "LMS_ENDPOINTS",
            "at least one classroom is required".to_string(),
        ));
    }
    Ok(endpoints)
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
