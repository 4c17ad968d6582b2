// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the pipeline components.

use crate::models::ActivityKey;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("LMS API error: {0}")]
    LmsApi(String),

    #[error("Model API error: {0}")]
    ModelApi(String),

    #[error("Model returned an empty analysis")]
    EmptyResponse,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when an upstream service answers with HTTP 429.
    pub const RATE_LIMITED: &'static str = "Rate limit exceeded";

    /// Whether the error came from an upstream rate limiter.
    ///
    /// Clients map HTTP 429 to [`Self::RATE_LIMITED`]; only that marker
    /// counts. Rate-limited activities are left flagged and picked up by the
    /// next run.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AppError::LmsApi(msg) | AppError::ModelApi(msg) => msg.contains(Self::RATE_LIMITED),
            _ => false,
        }
    }

    /// Format the error with the identity of the activity it belongs to.
    pub fn with_activity(&self, key: &ActivityKey) -> String {
        format!(
            "[{}/{}/{} {}] {}",
            key.classroom_id, key.course_id, key.activity_id, key.activity_type, self
        )
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
