// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prompt construction for activity analysis.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::{Activity, ActivityType, EnrichedPayload};
use crate::services::enrichment::html_to_text;
use crate::time_utils::format_utc_rfc3339;

/// Heading prefix the templates ask for and the parser splits on.
pub const SECTION_HEADING: &str = "## ";
/// Line prefix closing each dimension.
pub const SUGGESTED_ACTION: &str = "Suggested action:";

const MAX_DESCRIPTION_CHARS: usize = 1_500;

static INLINE_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static TRAILING_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m) +$").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

const FORUM_TEMPLATE: &str = "\
You are reviewing a course discussion forum for its instructor.

Analyze the forum along at least 5 dimensions, for example: participation \
breadth, depth of interaction between students, instructor presence, quality \
and relevance of contributions, and students at risk of disengagement.

Format rules:
- Render each dimension as a level-2 heading (`## Dimension name`).
- Under each heading, list findings as bullets; put the key finding of each bullet in **bold**.
- End each dimension with exactly one line starting with `**Suggested action:**`.
- Order dimensions from highest to lowest impact on learning.
- Output markdown only. No greetings, no questions, no comments about this request.";

const ASSIGNMENT_TEMPLATE: &str = "\
You are reviewing an assignment's submissions for its instructor.

Analyze the submissions along at least 5 dimensions, for example: submission \
rate and timeliness, grade distribution, feedback coverage and quality, \
recurring difficulties, and students needing follow-up.

Format rules:
- Render each dimension as a level-2 heading (`## Dimension name`).
- Under each heading, list findings as bullets; put the key finding of each bullet in **bold**.
- End each dimension with exactly one line starting with `**Suggested action:**`.
- Order dimensions from highest to lowest impact on learning.
- Output markdown only. No greetings, no questions, no comments about this request.";

const GENERIC_TEMPLATE: &str = "\
You are reviewing a course activity for its instructor.

Analyze the activity along at least 4 dimensions, for example: clarity of \
the activity, student engagement, alignment with course goals, and risks.

Format rules:
- Render each dimension as a level-2 heading (`## Dimension name`).
- Under each heading, list findings as bullets; put the key finding of each bullet in **bold**.
- End each dimension with exactly one line starting with `**Suggested action:**`.
- Order dimensions from highest to lowest impact on learning.
- Output markdown only. No greetings, no questions, no comments about this request.";

/// Instruction template for an activity type.
pub fn template_for(activity_type: &ActivityType) -> &'static str {
    match activity_type {
        ActivityType::Forum => FORUM_TEMPLATE,
        ActivityType::Assignment => ASSIGNMENT_TEMPLATE,
        ActivityType::Other(_) => GENERIC_TEMPLATE,
    }
}

/// Compose the final, sanitized prompt for one activity.
pub fn build_prompt(activity: &Activity, payload: &EnrichedPayload) -> String {
    let due = activity
        .due_at
        .map(format_utc_rfc3339)
        .unwrap_or_else(|| "no due date".to_string());
    let description = truncate(&html_to_text(&activity.description), MAX_DESCRIPTION_CHARS);
    let data = serde_json::to_string_pretty(payload).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Payload serialization failed");
        "{}".to_string()
    });

    let prompt = format!(
        "# Activity\n\
         - Name: {name}\n\
         - Type: {label}\n\
         - Classroom: {classroom}\n\
         - Course: {course}\n\
         - Due: {due}\n\
         - Description: {description}\n\
         \n\
         # Activity data (JSON)\n\
         ```json\n{data}\n```\n\
         \n\
         # Instructions\n\
         {template}\n",
        name = activity.name,
        label = activity.activity_type.label(),
        classroom = activity.classroom_id,
        course = activity.course_id,
        due = due,
        description = if description.is_empty() { "(none)" } else { description.as_str() },
        data = data,
        template = template_for(&activity.activity_type),
    );

    sanitize_prompt(&prompt)
}

/// Make text safe for the model transport.
///
/// Strips control and replacement/noncharacter code points (newlines and tabs
/// survive), collapses repeated spaces and blank lines, and normalizes to NFC.
pub fn sanitize_prompt(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| match c {
            '\n' | '\t' => true,
            '\u{FFFD}' | '\u{FFFE}' | '\u{FFFF}' => false,
            c => !c.is_control(),
        })
        .collect();

    let collapsed = INLINE_SPACE_RE.replace_all(&cleaned, " ");
    let collapsed = TRAILING_SPACE_RE.replace_all(&collapsed, "");
    let collapsed = BLANK_LINES_RE.replace_all(&collapsed, "\n\n");

    collapsed.trim().nfc().collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawSource;
    use chrono::Utc;

    fn make_activity(activity_type: ActivityType) -> Activity {
        Activity {
            doc_id: "c1_10_7_forum".to_string(),
            classroom_id: "c1".to_string(),
            course_id: "10".to_string(),
            activity_id: "7".to_string(),
            activity_type,
            name: "Week 3 debate".to_string(),
            description: "<p>Discuss   the reading</p>".to_string(),
            open_at: None,
            due_at: None,
            visible: true,
            raw_payload: serde_json::Value::Null,
            needs_analysis: true,
            analysis_count: 0,
            last_synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_contains_header_payload_and_template() {
        let activity = make_activity(ActivityType::Forum);
        let payload = EnrichedPayload::Passthrough {
            raw: RawSource::Inline(serde_json::json!({"marker": "payload-here"})),
        };
        let prompt = build_prompt(&activity, &payload);

        assert!(prompt.starts_with("# Activity"));
        assert!(prompt.contains("- Name: Week 3 debate"));
        assert!(prompt.contains("- Type: Discussion forum"));
        assert!(prompt.contains("- Due: no due date"));
        assert!(prompt.contains("- Description: Discuss the reading"));
        assert!(prompt.contains("payload-here"));
        assert!(prompt.contains("course discussion forum"));
        assert!(prompt.contains("**Suggested action:**"));
    }

    #[test]
    fn test_template_selection() {
        assert!(template_for(&ActivityType::Assignment).contains("submissions"));
        assert!(template_for(&ActivityType::Forum).contains("forum"));
        assert!(template_for(&ActivityType::Other("quiz".to_string())).contains("at least 4"));
    }

    #[test]
    fn test_description_is_capped() {
        let mut activity = make_activity(ActivityType::Assignment);
        activity.description = "a".repeat(4_000);
        let payload = EnrichedPayload::Passthrough {
            raw: RawSource::Inline(serde_json::Value::Null),
        };
        let prompt = build_prompt(&activity, &payload);
        assert!(prompt.contains(&format!("{}...", "a".repeat(MAX_DESCRIPTION_CHARS))));
        assert!(!prompt.contains(&"a".repeat(MAX_DESCRIPTION_CHARS + 1)));
    }

    #[test]
    fn test_sanitize_strips_controls_and_collapses_whitespace() {
        let dirty = "Hello\u{0007}  world\t\t!\r\n\n\n\nNext\u{FFFD} line   \n";
        assert_eq!(sanitize_prompt(dirty), "Hello world !\n\nNext line");
    }

    #[test]
    fn test_sanitize_normalizes_to_nfc() {
        let decomposed = "Cafe\u{0301}";
        assert_eq!(sanitize_prompt(decomposed), "Caf\u{00E9}");
    }
}
