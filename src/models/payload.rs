// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Enriched activity payloads handed to the prompt builder.
//!
//! These are ephemeral: built per activity, optimized, serialized into the
//! prompt, and stored only as an audit copy on the analysis record.

use serde::{Deserialize, Serialize};

/// Copy of the raw LMS payload carried alongside the enriched data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSource {
    /// Placeholder left by the optimizer when the raw copy was dropped.
    Omitted { note: String, original_size: usize },
    /// Raw payload as received.
    Inline(serde_json::Value),
}

/// Type-tagged enriched payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EnrichedPayload {
    Assignment(AssignmentPayload),
    Forum(ForumPayload),
    /// Unsupported activity types: raw payload forwarded unchanged.
    Passthrough { raw: RawSource },
}

// ─── Assignments ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub submissions: Vec<Submission>,
    pub stats: SubmissionStats,
    pub raw: RawSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: i64,
    /// LMS status ("submitted", "draft", "new", ...)
    pub status: String,
    pub submitted_at: Option<String>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub late: bool,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author_id: i64,
    pub text: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
}

/// Aggregates computed while normalizing submissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total: usize,
    pub submitted: usize,
    pub drafts: usize,
    pub graded: usize,
    pub late: usize,
    pub with_comments: usize,
    pub with_feedback: usize,
    pub average_grade: Option<f64>,
    pub min_grade: Option<f64>,
    pub max_grade: Option<f64>,
}

// ─── Forums ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPayload {
    pub discussions: Vec<Discussion>,
    pub stats: ForumStats,
    pub raw: RawSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: i64,
    pub name: String,
    /// Group the discussion belongs to; `None` for all-participants discussions
    pub group_id: Option<i64>,
    pub author_id: i64,
    pub created_at: Option<String>,
    /// Posts in LMS order, parent-linked
    pub posts: Vec<Post>,
    pub stats: DiscussionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Parent post; `None` for the discussion's opening post
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub author_role: Option<String>,
    pub subject: String,
    pub message: String,
    pub created_at: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl Post {
    /// Whether the author is course staff.
    pub fn by_instructor(&self) -> bool {
        self.author_role
            .as_deref()
            .is_some_and(|role| matches!(role, "teacher" | "editingteacher" | "manager"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscussionStats {
    pub post_count: usize,
    pub unique_participants: usize,
    pub average_post_length: f64,
    pub posts_with_attachments: usize,
    pub instructor_posts: usize,
    pub thread_depth: u32,
}

/// Forum-wide aggregates derived from the enriched discussions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForumStats {
    pub total_discussions: usize,
    pub total_posts: usize,
    pub unique_participants: usize,
    pub average_posts_per_discussion: f64,
    pub discussions_with_interaction: usize,
    pub max_thread_depth: u32,
}
