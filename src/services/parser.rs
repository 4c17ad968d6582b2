// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Model response parsing.
//!
//! Splits the markdown into headed sections and pulls insights, alerts and
//! recommendations out of it. Insight/alert classification is lexical: it
//! looks for affirmative or negative words in emphasized bullets, so it will
//! misfile some findings. When a bullet qualifies as both, it is an alert.
//!
//! Everything here is pure text processing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AnalysisSection, ParsedAnalysis, SectionFormat};
use crate::services::prompt::SECTION_HEADING;

/// Sections with this much content or less are dropped.
pub const MIN_SECTION_CONTENT_CHARS: usize = 20;
/// Cap for both the insight and the alert lists.
pub const MAX_FINDINGS: usize = 5;

const SUMMARY_MIN_CHARS: usize = 50;
const SUMMARY_PREFIX_CHARS: usize = 500;
const MAX_FINDING_CHARS: usize = 300;

static TABLE_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)+\|?\s*$").expect("valid regex")
});
static NUMBERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+\S").expect("valid regex"));
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*•]\s+\S").expect("valid regex"));

static BULLET_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*•]\s+(.+)$").expect("valid regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*[^*]+\*\*").expect("valid regex"));

static POSITIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(effective|effectively|adequate|adequately|multiple|successfully|successful|strong|good|excellent|consistent|consistently|active|actively|engaged|timely|clear|well)\b",
    )
    .expect("valid regex")
});
static NEGATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(no|not|none|without|lack|lacks|lacking|low|few|absence|absent|missing|insufficient|limited|problem|problems|risk|risks|concern|concerning|weak|poor|late|inactive|disengaged)\b",
    )
    .expect("valid regex")
});

static LEGACY_POSITIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:[-*]\s*)?(?:(?:✅|👍|💪|🌟|✔️?)\s*|(?:\*\*)?(?:finding|strength|positive)(?:\*\*)?\s*:\s*(?:\*\*)?\s*)(.+)$",
    )
    .expect("valid regex")
});
static LEGACY_ALERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:[-*]\s*)?(?:(?:⚠️?|🚩|❌|🔴)\s*|(?:\*\*)?(?:risk|alert|warning|concern)(?:\*\*)?\s*:\s*(?:\*\*)?\s*)(.+)$",
    )
    .expect("valid regex")
});

static SUGGESTED_ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:[-*>]\s*)?(?:\*\*|__)?suggested action\s*:?\s*(?:\*\*|__)?\s*:?\s*(.+)$")
        .expect("valid regex")
});

/// Parse the model's markdown into a structured analysis.
pub fn parse_analysis(markdown: &str) -> ParsedAnalysis {
    let markdown = markdown.trim();
    let sections = split_sections(markdown);
    let (insights, alerts) = extract_findings(markdown);

    let summary = sections
        .first()
        .map(|s| s.content.as_str())
        .filter(|content| content.chars().count() > SUMMARY_MIN_CHARS)
        .map(str::to_string)
        .unwrap_or_else(|| prefix(markdown, SUMMARY_PREFIX_CHARS));

    ParsedAnalysis {
        summary,
        sections,
        insights,
        alerts,
        recommendations: extract_recommendations(markdown),
        full_analysis: markdown.to_string(),
    }
}

/// Split on level-2 headings. Text before the first heading is ignored.
pub fn split_sections(markdown: &str) -> Vec<AnalysisSection> {
    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();

    for line in markdown.lines() {
        if let Some(title) = line.strip_prefix(SECTION_HEADING) {
            blocks.push((clean_title(title), Vec::new()));
        } else if let Some((_, content)) = blocks.last_mut() {
            content.push(line);
        }
    }

    blocks
        .into_iter()
        .map(|(title, lines)| (title, lines.join("\n").trim().to_string()))
        .filter(|(_, content)| content.chars().count() > MIN_SECTION_CONTENT_CHARS)
        .enumerate()
        .map(|(idx, (title, content))| AnalysisSection {
            id: section_id(idx, &title),
            format: detect_format(&content),
            title,
            content,
        })
        .collect()
}

/// Classify content shape: table, numbered list, bullet list, then text.
pub fn detect_format(content: &str) -> SectionFormat {
    if content.contains('|') && TABLE_SEPARATOR_RE.is_match(content) {
        SectionFormat::Table
    } else if NUMBERED_RE.is_match(content) {
        SectionFormat::NumberedList
    } else if BULLET_RE.is_match(content) {
        SectionFormat::BulletList
    } else {
        SectionFormat::Text
    }
}

/// Extract `(insights, alerts)` from emphasized bullets.
///
/// Falls back to emoji/label conventions for whichever list comes up empty.
pub fn extract_findings(markdown: &str) -> (Vec<String>, Vec<String>) {
    let mut insights = Vec::new();
    let mut alerts = Vec::new();

    for caps in BULLET_LINE_RE.captures_iter(markdown) {
        let bullet = &caps[1];
        if !BOLD_RE.is_match(bullet) || SUGGESTED_ACTION_RE.is_match(bullet) {
            continue;
        }
        if NEGATIVE_RE.is_match(bullet) {
            alerts.push(clean_finding(bullet));
        } else if POSITIVE_RE.is_match(bullet) {
            insights.push(clean_finding(bullet));
        }
    }

    if alerts.is_empty() {
        alerts = LEGACY_ALERT_RE
            .captures_iter(markdown)
            .map(|caps| clean_finding(&caps[1]))
            .collect();
    }
    if insights.is_empty() {
        insights = LEGACY_POSITIVE_RE
            .captures_iter(markdown)
            .filter(|caps| !LEGACY_ALERT_RE.is_match(&caps[0]))
            .map(|caps| clean_finding(&caps[1]))
            .filter(|finding| !alerts.contains(finding))
            .collect();
    }

    dedup_in_place(&mut insights);
    dedup_in_place(&mut alerts);
    insights.truncate(MAX_FINDINGS);
    alerts.truncate(MAX_FINDINGS);
    (insights, alerts)
}

/// Text following every suggested-action marker, in document order.
pub fn extract_recommendations(markdown: &str) -> Vec<String> {
    SUGGESTED_ACTION_RE
        .captures_iter(markdown)
        .map(|caps| strip_emphasis(&caps[1]))
        .filter(|r| !r.is_empty())
        .collect()
}

fn clean_title(raw: &str) -> String {
    strip_emphasis(raw.trim().trim_end_matches('#'))
}

fn clean_finding(raw: &str) -> String {
    prefix(&strip_emphasis(raw), MAX_FINDING_CHARS)
}

fn strip_emphasis(text: &str) -> String {
    text.replace("**", "").replace("__", "").trim().to_string()
}

fn section_id(idx: usize, title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        format!("section-{}", idx + 1)
    } else {
        format!("{}-{}", idx + 1, slug)
    }
}

fn prefix(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
## Participation breadth
- **Multiple students** posted more than once, showing active engagement.
- **Low participation** from late joiners; eight students have no posts.
**Suggested action:** Send a reminder to students without posts.

## Instructor presence
- **Instructor replies were effective** and arrived within a day.
- **No feedback** was given on the final summary thread.
**Suggested action:** Close the discussion with a short synthesis.

## Grade overview
| Range | Students |
|-------|----------|
| 90-100 | 4 |
| 70-89 | 9 |
";

    #[test]
    fn test_split_three_sections() {
        let sections = split_sections(SAMPLE);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "Participation breadth");
        assert_eq!(sections[1].title, "Instructor presence");
        assert_eq!(sections[2].title, "Grade overview");
        assert_eq!(sections[0].id, "1-participation-breadth");
    }

    #[test]
    fn test_short_sections_dropped() {
        let md = "## Empty\n\n## Real\nThis section has enough content to be kept.";
        let sections = split_sections(md);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Real");
    }

    #[test]
    fn test_deeper_headings_stay_inside_section() {
        let md = "## Top\n### Detail\nSome detail text that is long enough.";
        let sections = split_sections(md);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.starts_with("### Detail"));
    }

    #[test]
    fn test_detect_format_priority() {
        assert_eq!(
            detect_format("| a | b |\n|---|---|\n| 1 | 2 |"),
            SectionFormat::Table
        );
        assert_eq!(
            detect_format("1. first\n2. second\n- nested"),
            SectionFormat::NumberedList
        );
        assert_eq!(detect_format("- one\n- two"), SectionFormat::BulletList);
        assert_eq!(detect_format("a | b without separator"), SectionFormat::Text);
    }

    #[test]
    fn test_findings_classification() {
        let (insights, alerts) = extract_findings(SAMPLE);
        assert_eq!(
            insights,
            vec![
                "Multiple students posted more than once, showing active engagement.",
                "Instructor replies were effective and arrived within a day.",
            ]
        );
        assert_eq!(
            alerts,
            vec![
                "Low participation from late joiners; eight students have no posts.",
                "No feedback was given on the final summary thread.",
            ]
        );
    }

    #[test]
    fn test_alert_takes_precedence() {
        let md = "- **Effective prompts** but no replies from students";
        let (insights, alerts) = extract_findings(md);
        assert!(insights.is_empty());
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_legacy_fallback() {
        let md = "✅ Students cite the readings\nRisk: two students never logged in\n⚠️ Deadline overlaps exams";
        let (insights, alerts) = extract_findings(md);
        assert_eq!(insights, vec!["Students cite the readings"]);
        assert_eq!(
            alerts,
            vec!["two students never logged in", "Deadline overlaps exams"]
        );
    }

    #[test]
    fn test_findings_capped() {
        let md: String = (0..9)
            .map(|i| format!("- **Strong** contribution number {}\n", i))
            .collect();
        let (insights, _) = extract_findings(&md);
        assert_eq!(insights.len(), MAX_FINDINGS);
    }

    #[test]
    fn test_recommendations() {
        let recs = extract_recommendations(SAMPLE);
        assert_eq!(
            recs,
            vec![
                "Send a reminder to students without posts.",
                "Close the discussion with a short synthesis.",
            ]
        );
    }

    #[test]
    fn test_summary_from_first_section() {
        let parsed = parse_analysis(SAMPLE);
        assert!(parsed.summary.starts_with("- **Multiple students**"));
        assert_eq!(parsed.full_analysis, SAMPLE.trim());
        assert_eq!(parsed.sections[2].format, SectionFormat::Table);
    }

    #[test]
    fn test_summary_falls_back_to_prefix() {
        let md = "Plain answer without any headings at all.";
        let parsed = parse_analysis(md);
        assert!(parsed.sections.is_empty());
        assert_eq!(parsed.summary, md);
    }
}
