// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Analysis records produced from model output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::activity::doc_id_part;
use crate::models::{ActivityKey, ActivityType, EnrichedPayload};

/// Structural shape detected for a section's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionFormat {
    Table,
    NumberedList,
    BulletList,
    Text,
}

/// One headed block of the model's markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub id: String,
    pub title: String,
    pub content: String,
    pub format: SectionFormat,
}

/// Output of the response parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnalysis {
    pub summary: String,
    pub sections: Vec<AnalysisSection>,
    pub insights: Vec<String>,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub full_analysis: String,
}

/// Metadata returned by the model alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponseMeta {
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
    pub prompt_chars: usize,
}

/// Identity of a stored analysis.
///
/// One per activity, plus one per discussion group for group-partitioned
/// forum analyses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisKey {
    /// Classroom-scoped course id
    pub course_key: String,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub group_id: Option<i64>,
}

impl AnalysisKey {
    pub fn for_activity(key: &ActivityKey) -> Self {
        Self {
            course_key: key.course_key(),
            activity_id: key.activity_id.clone(),
            activity_type: key.activity_type.clone(),
            group_id: None,
        }
    }

    pub fn for_group(key: &ActivityKey, group_id: i64) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::for_activity(key)
        }
    }

    /// Document ID for the analysis record.
    ///
    /// `course_key` is already encoded by [`ActivityKey::course_key`].
    pub fn doc_id(&self) -> String {
        let base = format!(
            "{}_{}_{}",
            self.course_key,
            doc_id_part(&self.activity_id),
            doc_id_part(self.activity_type.as_str())
        );
        match self.group_id {
            Some(group_id) => format!("{}_group_{}", base, group_id),
            None => base,
        }
    }
}

/// Persisted analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Document ID (derived from [`AnalysisKey`])
    pub doc_id: String,
    pub key: AnalysisKey,
    pub classroom_id: String,
    pub course_id: String,
    pub activity_name: String,
    pub summary: String,
    pub insights: Vec<String>,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub full_analysis: String,
    pub sections: Vec<AnalysisSection>,
    /// Optimized payload actually sent to the model
    pub input_payload: EnrichedPayload,
    pub model_response: ModelResponseMeta,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub last_updated: DateTime<Utc>,
    pub is_valid: bool,
}
