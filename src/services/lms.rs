// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! LMS content client for fetching forum discussions and posts.
//!
//! Handles:
//! - One web-service endpoint per classroom
//! - Lenient decoding of LMS records (missing fields default)
//! - Rate limit detection (activity is retried on the next run)

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::LmsEndpoint;
use crate::error::{AppError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Source of forum content, keyed by classroom.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List the discussions of a forum.
    async fn forum_discussions(&self, classroom_id: &str, forum_id: &str)
        -> Result<Vec<LmsDiscussion>>;

    /// List every post of a discussion, parent-linked.
    async fn discussion_posts(&self, classroom_id: &str, discussion_id: i64)
        -> Result<Vec<LmsPost>>;
}

/// Discussion record as returned by the LMS (and cached in activity payloads).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LmsDiscussion {
    /// Discussion id
    #[serde(alias = "discussionid")]
    pub discussion: i64,
    #[serde(default)]
    pub name: String,
    /// `-1` or `0` means "all participants"
    #[serde(default)]
    pub groupid: i64,
    #[serde(default)]
    pub userid: i64,
    #[serde(default)]
    pub created: i64,
    /// Present when the sync job cached the posts alongside the discussion
    #[serde(default)]
    pub posts: Vec<LmsPost>,
}

/// Post record as returned by the LMS.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LmsPost {
    pub id: i64,
    #[serde(default)]
    pub parentid: Option<i64>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timecreated: i64,
    #[serde(default)]
    pub author: LmsAuthor,
    #[serde(default)]
    pub attachments: Vec<LmsFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LmsAuthor {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub fullname: String,
    /// Course role shortname, when the LMS exposes it
    #[serde(default)]
    pub role: Option<String>,
}

/// File metadata attached to posts and submissions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LmsFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub filesize: u64,
}

#[derive(Debug, Deserialize)]
struct DiscussionsResponse {
    #[serde(default)]
    discussions: Vec<LmsDiscussion>,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<LmsPost>,
}

/// LMS web-service client.
#[derive(Clone)]
pub struct LmsClient {
    http: reqwest::Client,
    endpoints: HashMap<String, LmsEndpoint>,
}

impl LmsClient {
    /// Create a client for the configured classrooms.
    pub fn new(endpoints: HashMap<String, LmsEndpoint>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::LmsApi(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, endpoints })
    }

    fn endpoint(&self, classroom_id: &str) -> Result<&LmsEndpoint> {
        self.endpoints
            .get(classroom_id)
            .ok_or_else(|| AppError::NotFound(format!("No LMS endpoint for classroom {}", classroom_id)))
    }

    /// Call a web-service function and decode its JSON response.
    async fn call<T: DeserializeOwned>(
        &self,
        classroom_id: &str,
        function: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let endpoint = self.endpoint(classroom_id)?;
        let url = format!(
            "{}/webservice/rest/server.php",
            endpoint.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("wstoken", endpoint.token.as_str()),
                ("wsfunction", function),
                ("moodlewsrestformat", "json"),
            ])
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::LmsApi(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::LmsApi(format!("Failed to read body: {}", e)))?;
        // LMS text is user-authored; invalid UTF-8 must not sink the activity.
        let body = String::from_utf8_lossy(&bytes);

        if status.as_u16() == 429 {
            tracing::warn!(classroom_id, function, "LMS rate limit hit (429)");
            return Err(AppError::LmsApi(AppError::RATE_LIMITED.to_string()));
        }
        if !status.is_success() {
            return Err(AppError::LmsApi(format!("HTTP {}: {}", status, body)));
        }

        decode_ws_response(&body)
    }
}

/// Decode a web-service body, surfacing in-band exceptions as errors.
fn decode_ws_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AppError::LmsApi(format!("JSON parse error: {}", e)))?;

    if let Some(exception) = value.get("exception").and_then(|e| e.as_str()) {
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default();
        return Err(AppError::LmsApi(format!("{}: {}", exception, message)));
    }

    serde_json::from_value(value).map_err(|e| AppError::LmsApi(format!("Unexpected shape: {}", e)))
}

#[async_trait]
impl ContentSource for LmsClient {
    async fn forum_discussions(
        &self,
        classroom_id: &str,
        forum_id: &str,
    ) -> Result<Vec<LmsDiscussion>> {
        let response: DiscussionsResponse = self
            .call(
                classroom_id,
                "mod_forum_get_forum_discussions",
                &[("forumid", forum_id.to_string())],
            )
            .await?;
        Ok(response.discussions)
    }

    async fn discussion_posts(
        &self,
        classroom_id: &str,
        discussion_id: i64,
    ) -> Result<Vec<LmsPost>> {
        let response: PostsResponse = self
            .call(
                classroom_id,
                "mod_forum_get_discussion_posts",
                &[("discussionid", discussion_id.to_string())],
            )
            .await?;
        Ok(response.posts)
    }
}
