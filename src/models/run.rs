// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Batch run inputs and outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Activity, ActivityType};

/// Filters accepted by the filtered entry point and activity listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFilters {
    pub classroom_id: Option<String>,
    pub course_id: Option<String>,
    pub activity_type: Option<ActivityType>,
    /// Explicit activity ids (LMS ids, not document ids)
    #[serde(default)]
    pub activity_ids: Vec<String>,
    /// Bypass the `needs_analysis` predicate
    #[serde(default)]
    pub force_reanalysis: bool,
}

/// Store-level query for candidate activities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityQuery {
    pub classroom_id: Option<String>,
    pub course_id: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub activity_ids: Vec<String>,
    /// When false, the `needs_analysis = true` predicate is dropped
    pub only_pending: bool,
}

impl ActivityQuery {
    /// Everything flagged for analysis.
    pub fn pending() -> Self {
        Self {
            only_pending: true,
            ..Self::default()
        }
    }

    /// Whether an activity satisfies the store-side predicates.
    ///
    /// The open/close window is checked separately against the run clock.
    pub fn matches(&self, activity: &Activity) -> bool {
        activity.visible
            && (!self.only_pending || activity.needs_analysis)
            && self
                .classroom_id
                .as_ref()
                .is_none_or(|id| *id == activity.classroom_id)
            && self
                .course_id
                .as_ref()
                .is_none_or(|id| *id == activity.course_id)
            && self
                .activity_type
                .as_ref()
                .is_none_or(|t| *t == activity.activity_type)
            && (self.activity_ids.is_empty() || self.activity_ids.contains(&activity.activity_id))
    }
}

impl From<&RunFilters> for ActivityQuery {
    fn from(filters: &RunFilters) -> Self {
        Self {
            classroom_id: filters.classroom_id.clone(),
            course_id: filters.course_id.clone(),
            activity_type: filters.activity_type.clone(),
            activity_ids: filters.activity_ids.clone(),
            only_pending: !filters.force_reanalysis,
        }
    }
}

/// Keyset cursor: position of the last activity of the previous page.
///
/// Sort order is `due_at` ascending, `last_synced_at` descending, `doc_id`
/// ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    pub due_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
    pub doc_id: String,
}

impl PageCursor {
    pub fn after(activity: &Activity) -> Self {
        Self {
            due_at: activity.due_at,
            last_synced_at: activity.last_synced_at,
            doc_id: activity.doc_id.clone(),
        }
    }
}

/// Summary returned by every run entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// False when the run stopped early on a run-level failure
    pub success: bool,
    /// Activities attempted
    pub processed: usize,
    /// Activity analyses stored
    pub generated: usize,
    /// Extra per-group forum analyses stored
    pub group_analyses: usize,
    /// Activities fetched but outside their open/close window
    pub skipped: usize,
    /// Non-empty pages visited
    pub pages: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Listing entry for activities matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub classroom_id: String,
    pub course_id: String,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub name: String,
    pub due_at: Option<DateTime<Utc>>,
    pub needs_analysis: bool,
    pub analysis_count: u32,
}

impl From<&Activity> for ActivitySummary {
    fn from(activity: &Activity) -> Self {
        Self {
            classroom_id: activity.classroom_id.clone(),
            course_id: activity.course_id.clone(),
            activity_id: activity.activity_id.clone(),
            activity_type: activity.activity_type.clone(),
            name: activity.name.clone(),
            due_at: activity.due_at,
            needs_analysis: activity.needs_analysis,
            analysis_count: activity.analysis_count,
        }
    }
}

/// Store-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_activities: u64,
    pub pending_activities: u64,
    pub total_analyses: u64,
    /// Analysis count per activity type
    #[serde(default)]
    pub analyses_by_type: HashMap<String, u64>,
}
