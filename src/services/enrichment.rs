// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Content enrichment: turns an activity's cached LMS payload into an
//! analysis-ready structure.
//!
//! Assignments are normalized from the cached submissions. Forums fetch the
//! full post list of every discussion whose posts were not cached. Enrichment is best-effort: a failed
//! post fetch degrades to the original payload instead of failing the
//! activity.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::payload::{
    AssignmentPayload, Attachment, Comment, Discussion, DiscussionStats, ForumPayload, ForumStats,
    Post, Submission, SubmissionStats,
};
use crate::models::{Activity, ActivityType, EnrichedPayload, RawSource};
use crate::services::lms::{ContentSource, LmsDiscussion, LmsFile, LmsPost};
use crate::time_utils::lms_timestamp;

/// Upper bound on parent hops walked when computing thread depth.
pub const MAX_THREAD_HOPS: u32 = 50;

const MAX_CONCURRENT_POST_FETCHES: usize = 4;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("valid regex"));

/// Enriches activities with their full content.
#[derive(Clone)]
pub struct ContentEnricher {
    lms: Arc<dyn ContentSource>,
}

impl ContentEnricher {
    pub fn new(lms: Arc<dyn ContentSource>) -> Self {
        Self { lms }
    }

    /// Build the enriched payload for an activity.
    ///
    /// Only fails when a forum has no cached discussions and the fresh
    /// fetch fails too: there is nothing to analyze in that case.
    pub async fn enrich(&self, activity: &Activity) -> Result<EnrichedPayload> {
        match &activity.activity_type {
            ActivityType::Assignment => Ok(EnrichedPayload::Assignment(enrich_assignment(
                &activity.raw_payload,
                activity.due_at,
            ))),
            ActivityType::Forum => self.enrich_forum(activity).await,
            ActivityType::Other(module) => {
                tracing::debug!(
                    activity_id = %activity.activity_id,
                    module = %module,
                    "No enrichment for activity type, forwarding raw payload"
                );
                Ok(EnrichedPayload::Passthrough {
                    raw: RawSource::Inline(activity.raw_payload.clone()),
                })
            }
        }
    }

    async fn enrich_forum(&self, activity: &Activity) -> Result<EnrichedPayload> {
        let mut discussions = cached_discussions(&activity.raw_payload);

        if discussions.is_empty() {
            tracing::info!(
                classroom_id = %activity.classroom_id,
                activity_id = %activity.activity_id,
                "Cached payload has no discussions, fetching from LMS"
            );
            discussions = self
                .lms
                .forum_discussions(&activity.classroom_id, &activity.activity_id)
                .await?;
        }

        let classroom_id = activity.classroom_id.as_str();
        let lms = &self.lms;
        let fetched: Vec<Result<(LmsDiscussion, Vec<LmsPost>)>> = stream::iter(discussions)
            .map(|mut discussion| async move {
                // Posts cached by the sync job are used without a fetch
                let cached = std::mem::take(&mut discussion.posts);
                if !cached.is_empty() {
                    return Ok::<_, AppError>((discussion, cached));
                }
                let posts = lms
                    .discussion_posts(classroom_id, discussion.discussion)
                    .await?;
                Ok((discussion, posts))
            })
            .buffered(MAX_CONCURRENT_POST_FETCHES)
            .collect()
            .await;

        let mut enriched = Vec::with_capacity(fetched.len());
        for item in fetched {
            match item {
                Ok((discussion, posts)) => enriched.push(build_discussion(discussion, posts)),
                Err(e) => {
                    tracing::warn!(
                        classroom_id = %activity.classroom_id,
                        activity_id = %activity.activity_id,
                        error = %e,
                        "Post fetch failed, using original payload"
                    );
                    return Ok(EnrichedPayload::Passthrough {
                        raw: RawSource::Inline(activity.raw_payload.clone()),
                    });
                }
            }
        }

        let stats = forum_stats(&enriched);
        tracing::debug!(
            activity_id = %activity.activity_id,
            discussions = stats.total_discussions,
            posts = stats.total_posts,
            participants = stats.unique_participants,
            "Forum enriched"
        );

        Ok(EnrichedPayload::Forum(ForumPayload {
            discussions: enriched,
            stats,
            raw: RawSource::Inline(activity.raw_payload.clone()),
        }))
    }
}

// ─── Assignments ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawAssignmentPayload {
    #[serde(default)]
    submissions: Vec<RawSubmission>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSubmission {
    #[serde(default)]
    userid: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    timemodified: i64,
    #[serde(default, deserialize_with = "lenient_grade")]
    grade: Option<f64>,
    #[serde(default, alias = "feedbackcomments")]
    feedback: Option<String>,
    #[serde(default)]
    late: Option<bool>,
    #[serde(default)]
    comments: Vec<RawComment>,
    #[serde(default, alias = "attachments")]
    files: Vec<LmsFile>,
}

#[derive(Debug, Default, Deserialize)]
struct RawComment {
    #[serde(default)]
    userid: i64,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timecreated: i64,
}

/// Grades arrive as numbers, numeric strings ("85.00"), or placeholders ("-").
fn lenient_grade<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|g| g.is_finite() && *g >= 0.0))
}

/// Normalize submissions and compute their aggregates in one pass.
pub fn enrich_assignment(
    raw: &serde_json::Value,
    due_at: Option<DateTime<Utc>>,
) -> AssignmentPayload {
    let parsed = RawAssignmentPayload::deserialize(raw).unwrap_or_default();

    let mut stats = SubmissionStats {
        total: parsed.submissions.len(),
        ..SubmissionStats::default()
    };
    let mut grade_sum = 0.0;
    let mut submissions = Vec::with_capacity(parsed.submissions.len());

    for raw_submission in parsed.submissions {
        let late = raw_submission.late.unwrap_or_else(|| {
            due_at.is_some_and(|due| {
                raw_submission.timemodified > 0 && raw_submission.timemodified > due.timestamp()
            })
        });
        let feedback = raw_submission
            .feedback
            .as_deref()
            .map(html_to_text)
            .filter(|f| !f.is_empty());

        match raw_submission.status.as_str() {
            "submitted" => stats.submitted += 1,
            "draft" => stats.drafts += 1,
            _ => {}
        }
        if let Some(grade) = raw_submission.grade {
            stats.graded += 1;
            grade_sum += grade;
            stats.min_grade = Some(stats.min_grade.map_or(grade, |m| m.min(grade)));
            stats.max_grade = Some(stats.max_grade.map_or(grade, |m| m.max(grade)));
        }
        if late {
            stats.late += 1;
        }
        if !raw_submission.comments.is_empty() {
            stats.with_comments += 1;
        }
        if feedback.is_some() {
            stats.with_feedback += 1;
        }

        submissions.push(Submission {
            user_id: raw_submission.userid,
            status: raw_submission.status,
            submitted_at: lms_timestamp(raw_submission.timemodified),
            grade: raw_submission.grade,
            feedback,
            late,
            comments: raw_submission
                .comments
                .into_iter()
                .map(|c| Comment {
                    author_id: c.userid,
                    text: html_to_text(&c.content),
                    created_at: lms_timestamp(c.timecreated),
                })
                .collect(),
            attachments: raw_submission.files.into_iter().map(attachment).collect(),
        });
    }

    if stats.graded > 0 {
        stats.average_grade = Some(grade_sum / stats.graded as f64);
    }

    AssignmentPayload {
        submissions,
        stats,
        raw: RawSource::Inline(raw.clone()),
    }
}

// ─── Forums ──────────────────────────────────────────────────

/// Discussions cached by the sync job, if any.
fn cached_discussions(raw: &serde_json::Value) -> Vec<LmsDiscussion> {
    raw.get("discussions")
        .cloned()
        .and_then(|d| serde_json::from_value(d).ok())
        .unwrap_or_default()
}

/// Normalize a discussion and its posts, computing per-discussion stats.
pub fn build_discussion(discussion: LmsDiscussion, posts: Vec<LmsPost>) -> Discussion {
    let posts: Vec<Post> = posts.into_iter().map(post).collect();
    let stats = discussion_stats(&posts);

    Discussion {
        id: discussion.discussion,
        name: discussion.name,
        group_id: (discussion.groupid > 0).then_some(discussion.groupid),
        author_id: discussion.userid,
        created_at: lms_timestamp(discussion.created),
        posts,
        stats,
    }
}

fn post(raw: LmsPost) -> Post {
    Post {
        id: raw.id,
        // The LMS uses 0 for "no parent"
        parent_id: raw.parentid.filter(|p| *p > 0),
        author_id: raw.author.id,
        author_role: raw.author.role,
        subject: raw.subject,
        message: html_to_text(&raw.message),
        created_at: lms_timestamp(raw.timecreated),
        attachments: raw.attachments.into_iter().map(attachment).collect(),
    }
}

fn attachment(file: LmsFile) -> Attachment {
    Attachment {
        filename: file.filename,
        mime_type: file.mimetype,
        size_bytes: file.filesize,
    }
}

pub fn discussion_stats(posts: &[Post]) -> DiscussionStats {
    let participants: HashSet<i64> = posts.iter().map(|p| p.author_id).collect();
    let total_length: usize = posts.iter().map(|p| p.message.chars().count()).sum();

    DiscussionStats {
        post_count: posts.len(),
        unique_participants: participants.len(),
        average_post_length: if posts.is_empty() {
            0.0
        } else {
            total_length as f64 / posts.len() as f64
        },
        posts_with_attachments: posts.iter().filter(|p| !p.attachments.is_empty()).count(),
        instructor_posts: posts.iter().filter(|p| p.by_instructor()).count(),
        thread_depth: thread_depth(posts),
    }
}

/// Maximum number of parent links between any post and its root.
///
/// Each walk stops at a root, a parent missing from the list, a node already
/// seen on the same walk (cycle), or after [`MAX_THREAD_HOPS`].
pub fn thread_depth(posts: &[Post]) -> u32 {
    let parents: HashMap<i64, Option<i64>> = posts.iter().map(|p| (p.id, p.parent_id)).collect();

    let mut max_depth = 0;
    for post in posts {
        let mut visited = HashSet::from([post.id]);
        let mut current = post.parent_id;
        let mut hops = 0;

        while let Some(parent) = current {
            if hops >= MAX_THREAD_HOPS || !visited.insert(parent) {
                break;
            }
            let Some(next) = parents.get(&parent) else {
                break;
            };
            hops += 1;
            current = *next;
        }
        max_depth = max_depth.max(hops);
    }
    max_depth
}

/// Forum-wide aggregates derived from enriched discussions.
pub fn forum_stats(discussions: &[Discussion]) -> ForumStats {
    let participants: HashSet<i64> = discussions
        .iter()
        .flat_map(|d| d.posts.iter().map(|p| p.author_id))
        .collect();
    let total_posts: usize = discussions.iter().map(|d| d.posts.len()).sum();

    ForumStats {
        total_discussions: discussions.len(),
        total_posts,
        unique_participants: participants.len(),
        average_posts_per_discussion: if discussions.is_empty() {
            0.0
        } else {
            total_posts as f64 / discussions.len() as f64
        },
        discussions_with_interaction: discussions
            .iter()
            .filter(|d| d.stats.unique_participants > 1)
            .count(),
        max_thread_depth: discussions
            .iter()
            .map(|d| d.stats.thread_depth)
            .max()
            .unwrap_or(0),
    }
}

/// Reduce LMS HTML to visible text.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
