// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity model synced from the LMS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of coursework an activity represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Assignment,
    Forum,
    /// Any other LMS module (quiz, page, ...). Analyzed with the generic template.
    #[serde(untagged)]
    Other(String),
}

impl ActivityType {
    /// Parse the LMS module name.
    pub fn from_module(module: &str) -> Self {
        match module.to_ascii_lowercase().as_str() {
            "assign" | "assignment" => ActivityType::Assignment,
            "forum" => ActivityType::Forum,
            other => ActivityType::Other(other.to_string()),
        }
    }

    /// Stable identifier used in document keys and filters.
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::Assignment => "assignment",
            ActivityType::Forum => "forum",
            ActivityType::Other(name) => name,
        }
    }

    /// Human label used in prompts.
    pub fn label(&self) -> &str {
        match self {
            ActivityType::Assignment => "Assignment",
            ActivityType::Forum => "Discussion forum",
            ActivityType::Other(_) => "Activity",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityKey {
    pub classroom_id: String,
    pub course_id: String,
    pub activity_id: String,
    pub activity_type: ActivityType,
}

/// Encode one component of a composite document ID.
///
/// `_` joins components, so it is percent-encoded inside them too.
pub fn doc_id_part(part: &str) -> String {
    urlencoding::encode(part).replace('_', "%5F")
}

impl ActivityKey {
    /// Course id scoped to its classroom (course ids repeat across classrooms).
    pub fn course_key(&self) -> String {
        format!(
            "{}_{}",
            doc_id_part(&self.classroom_id),
            doc_id_part(&self.course_id)
        )
    }

    /// Document ID for the activity record.
    pub fn doc_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.course_key(),
            doc_id_part(&self.activity_id),
            doc_id_part(self.activity_type.as_str())
        )
    }
}

/// Stored activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Document ID (derived from the composite identity)
    pub doc_id: String,
    pub classroom_id: String,
    pub course_id: String,
    pub activity_id: String,
    pub activity_type: ActivityType,
    /// Activity name/title
    pub name: String,
    /// Description as authored in the LMS (may contain HTML)
    #[serde(default)]
    pub description: String,
    /// Opening time; `None` means no lower bound
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub open_at: Option<DateTime<Utc>>,
    /// Due/close time; `None` means no upper bound
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub due_at: Option<DateTime<Utc>>,
    /// Whether the activity is visible to students
    pub visible: bool,
    /// Raw payload as cached by the sync job
    #[serde(default)]
    pub raw_payload: serde_json::Value,
    /// Eligibility flag; cleared only after a successful analysis is stored
    pub needs_analysis: bool,
    /// Number of analyses stored for this activity
    #[serde(default)]
    pub analysis_count: u32,
    /// Last time the sync job refreshed this record
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub last_synced_at: DateTime<Utc>,
}

impl Activity {
    /// Build the composite identity.
    pub fn key(&self) -> ActivityKey {
        ActivityKey {
            classroom_id: self.classroom_id.clone(),
            course_id: self.course_id.clone(),
            activity_id: self.activity_id.clone(),
            activity_type: self.activity_type.clone(),
        }
    }

    /// Whether `now` falls inside the open/close window.
    ///
    /// Missing bounds are open-ended.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let opened = self.open_at.is_none_or(|open| open <= now);
        let not_closed = self.due_at.is_none_or(|due| now <= due);
        opened && not_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_activity() -> Activity {
        let now = Utc::now();
        Activity {
            doc_id: "c1_10_55_forum".to_string(),
            classroom_id: "c1".to_string(),
            course_id: "10".to_string(),
            activity_id: "55".to_string(),
            activity_type: ActivityType::Forum,
            name: "Week 1 forum".to_string(),
            description: String::new(),
            open_at: None,
            due_at: None,
            visible: true,
            raw_payload: serde_json::Value::Null,
            needs_analysis: true,
            analysis_count: 0,
            last_synced_at: now,
        }
    }

    #[test]
    fn test_no_window_is_always_open() {
        let activity = make_activity();
        assert!(activity.is_open_at(Utc::now()));
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        let mut activity = make_activity();
        activity.open_at = Some(now - Duration::days(1));
        activity.due_at = Some(now + Duration::days(1));
        assert!(activity.is_open_at(now));

        activity.due_at = Some(now - Duration::hours(1));
        assert!(!activity.is_open_at(now));

        activity.due_at = None;
        activity.open_at = Some(now + Duration::hours(1));
        assert!(!activity.is_open_at(now));
    }

    #[test]
    fn test_activity_type_from_module() {
        assert_eq!(ActivityType::from_module("assign"), ActivityType::Assignment);
        assert_eq!(ActivityType::from_module("Forum"), ActivityType::Forum);
        assert_eq!(
            ActivityType::from_module("quiz"),
            ActivityType::Other("quiz".to_string())
        );
    }

    #[test]
    fn test_activity_type_serde() {
        let json = serde_json::to_string(&ActivityType::Forum).unwrap();
        assert_eq!(json, "\"forum\"");
        let other: ActivityType = serde_json::from_str("\"quiz\"").unwrap();
        assert_eq!(other, ActivityType::Other("quiz".to_string()));
    }

    #[test]
    fn test_timestamps_stay_rfc3339_in_json() {
        let mut activity = make_activity();
        activity.due_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["due_at"], "2026-03-01T12:00:00Z");
        assert!(json["open_at"].is_null());

        let back: Activity = serde_json::from_value(json).unwrap();
        assert_eq!(back, activity);
    }

    #[test]
    fn test_missing_window_fields_default_to_none() {
        let json = serde_json::json!({
            "doc_id": "c1_10_55_forum",
            "classroom_id": "c1",
            "course_id": "10",
            "activity_id": "55",
            "activity_type": "forum",
            "name": "Week 1 forum",
            "visible": true,
            "needs_analysis": true,
            "last_synced_at": "2026-03-01T12:00:00.123456Z"
        });
        let activity: Activity = serde_json::from_value(json).unwrap();
        assert_eq!(activity.open_at, None);
        assert_eq!(activity.due_at, None);
    }

    #[test]
    fn test_doc_id_encodes_parts() {
        let key = ActivityKey {
            classroom_id: "c 1".to_string(),
            course_id: "10".to_string(),
            activity_id: "55".to_string(),
            activity_type: ActivityType::Assignment,
        };
        assert_eq!(key.doc_id(), "c%201_10_55_assignment");
        assert_eq!(key.course_key(), "c%201_10");
    }

    #[test]
    fn test_doc_id_underscore_ids_do_not_collide() {
        let key = |classroom: &str, course: &str| ActivityKey {
            classroom_id: classroom.to_string(),
            course_id: course.to_string(),
            activity_id: "5".to_string(),
            activity_type: ActivityType::Assignment,
        };
        let a = key("aula_1", "10");
        let b = key("aula", "1_10");

        assert_ne!(a.doc_id(), b.doc_id());
        assert_ne!(a.course_key(), b.course_key());
        assert_eq!(a.doc_id(), "aula%5F1_10_5_assignment");
        assert_eq!(b.doc_id(), "aula_1%5F10_5_assignment");
    }
}
