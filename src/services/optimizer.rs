// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payload size optimizer.
//!
//! A no-op while the serialized payload fits the budget. Over budget, the
//! payload is degraded in tiers: the raw duplicate is dropped, forum threads
//! are capped and long posts truncated, assignment submissions are capped.
//! A passthrough payload has no enriched copy, so its raw JSON is shrunk in
//! place (arrays capped, long strings truncated) instead of dropped.
//! The budget is best-effort: the result may still exceed it.

use crate::config::DEFAULT_PAYLOAD_BUDGET_BYTES;
use crate::models::payload::{AssignmentPayload, ForumPayload};
use crate::models::{EnrichedPayload, RawSource};
use serde_json::Value;

pub const MAX_POSTS_PER_DISCUSSION: usize = 50;
pub const MAX_POST_CHARS: usize = 5_000;
pub const MAX_SUBMISSIONS: usize = 10;
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// (max array items, max string chars) tried in order on passthrough JSON.
const RAW_SHRINK_TIERS: [(usize, usize); 2] = [
    (MAX_POSTS_PER_DISCUSSION, MAX_POST_CHARS),
    (MAX_SUBMISSIONS, 1_000),
];

const RAW_OMITTED_NOTE: &str = "Raw LMS payload omitted to fit the model input budget";

/// Shrinks payloads that exceed the model's input budget.
#[derive(Debug, Clone, Copy)]
pub struct PayloadOptimizer {
    budget_bytes: usize,
}

impl Default for PayloadOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_BUDGET_BYTES)
    }
}

impl PayloadOptimizer {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Return a payload no larger than the budget where possible.
    pub fn optimize(&self, payload: EnrichedPayload) -> EnrichedPayload {
        let original_size = serialized_size(&payload);
        if original_size <= self.budget_bytes {
            return payload;
        }

        let mut payload = payload;
        match &mut payload {
            EnrichedPayload::Forum(forum) => {
                omit_raw(&mut forum.raw);
                cap_forum(forum);
            }
            EnrichedPayload::Assignment(assignment) => {
                omit_raw(&mut assignment.raw);
                cap_assignment(assignment);
            }
            EnrichedPayload::Passthrough { raw } => {
                if let RawSource::Inline(value) = raw {
                    shrink_raw(value, self.budget_bytes);
                }
            }
        }

        let optimized_size = serialized_size(&payload);
        if optimized_size > self.budget_bytes {
            tracing::warn!(
                original_size,
                optimized_size,
                budget = self.budget_bytes,
                "Payload still over budget after optimization"
            );
        } else {
            tracing::info!(original_size, optimized_size, "Payload optimized");
        }
        payload
    }
}

/// Serialized JSON size in bytes.
pub fn serialized_size<T: serde::Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

fn omit_raw(raw: &mut RawSource) {
    if let RawSource::Inline(value) = raw {
        let original_size = serialized_size(value);
        *raw = RawSource::Omitted {
            note: RAW_OMITTED_NOTE.to_string(),
            original_size,
        };
    }
}

fn cap_forum(forum: &mut ForumPayload) {
    for discussion in &mut forum.discussions {
        discussion.posts.truncate(MAX_POSTS_PER_DISCUSSION);
        for post in &mut discussion.posts {
            truncate_chars(&mut post.message, MAX_POST_CHARS);
        }
    }
}

fn cap_assignment(assignment: &mut AssignmentPayload) {
    assignment.submissions.truncate(MAX_SUBMISSIONS);
}

/// Shrink raw JSON tier by tier until it fits `budget_bytes`.
fn shrink_raw(value: &mut Value, budget_bytes: usize) {
    for (max_items, max_chars) in RAW_SHRINK_TIERS {
        if serialized_size(value) <= budget_bytes {
            return;
        }
        shrink_value(value, max_items, max_chars);
    }
}

fn shrink_value(value: &mut Value, max_items: usize, max_chars: usize) {
    match value {
        Value::String(text) => truncate_chars(text, max_chars),
        Value::Array(items) => {
            items.truncate(max_items);
            for item in items {
                shrink_value(item, max_items, max_chars);
            }
        }
        Value::Object(fields) => {
            for field in fields.values_mut() {
                shrink_value(field, max_items, max_chars);
            }
        }
        _ => {}
    }
}

/// Truncate `text` to `max_chars` characters, appending the marker.
fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
        text.push_str(TRUNCATION_MARKER);
    }
}
