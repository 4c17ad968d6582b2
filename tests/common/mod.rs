// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use lms_insights::db::{AnalysisStore, FirestoreDb, MemoryStore};
use lms_insights::error::{AppError, Result};
use lms_insights::models::{Activity, ActivityKey, ActivityType};
use lms_insights::services::lms::{ContentSource, LmsAuthor, LmsDiscussion, LmsPost};
use lms_insights::services::{AnalysisModel, AnalysisOrchestrator, ModelResponse, RunSettings};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Markdown answer used by the scripted model.
#[allow(dead_code)]
pub const CANNED_ANALYSIS: &str = "\
## Participation breadth
- **Multiple students** posted in the first week, showing active engagement.
- **Low participation** among students who joined late.
**Suggested action:** Remind late joiners to post an introduction.

## Instructor presence
- **Instructor replies were effective** and arrived within a day.
**Suggested action:** Keep the same response rhythm.
";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique id for test isolation.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}{}", prefix, nanos)
}

// ─── Fakes ───────────────────────────────────────────────────

/// LMS fake serving canned discussions and posts.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeLms {
    discussions: DashMap<(String, String), Vec<LmsDiscussion>>,
    posts: DashMap<i64, Vec<LmsPost>>,
    failing_forums: DashMap<String, ()>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeLms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_discussions(&self, classroom_id: &str, forum_id: &str, discussions: Vec<LmsDiscussion>) {
        self.discussions
            .insert((classroom_id.to_string(), forum_id.to_string()), discussions);
    }

    pub fn add_posts(&self, discussion_id: i64, posts: Vec<LmsPost>) {
        self.posts.insert(discussion_id, posts);
    }

    /// Make discussion listing fail for a forum.
    pub fn fail_forum(&self, forum_id: &str) {
        self.failing_forums.insert(forum_id.to_string(), ());
    }
}

#[async_trait]
impl ContentSource for FakeLms {
    async fn forum_discussions(
        &self,
        classroom_id: &str,
        forum_id: &str,
    ) -> Result<Vec<LmsDiscussion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_forums.contains_key(forum_id) {
            return Err(AppError::LmsApi("HTTP 503: unavailable".to_string()));
        }
        Ok(self
            .discussions
            .get(&(classroom_id.to_string(), forum_id.to_string()))
            .map(|d| d.value().clone())
            .unwrap_or_default())
    }

    async fn discussion_posts(&self, _classroom_id: &str, discussion_id: i64) -> Result<Vec<LmsPost>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .posts
            .get(&discussion_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

/// Model fake answering every prompt with the same markdown.
#[allow(dead_code)]
pub struct ScriptedModel {
    answer: String,
    /// Prompts containing any of these markers fail
    failing_markers: HashSet<String>,
    prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            failing_markers: HashSet::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing_markers.insert(marker.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _max_output_tokens: u32) -> Result<ModelResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.failing_markers.iter().any(|m| prompt.contains(m.as_str())) {
            return Err(AppError::ModelApi("HTTP 500: overloaded".to_string()));
        }
        Ok(ModelResponse {
            text: self.answer.clone(),
            model: "scripted".to_string(),
            input_tokens: Some((prompt.len() / 4) as u32),
            output_tokens: Some((self.answer.len() / 4) as u32),
            stop_reason: Some("end_turn".to_string()),
        })
    }
}

/// Model fake that records how many `generate` calls overlap.
#[allow(dead_code)]
pub struct TrackingModel {
    delay: std::time::Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl TrackingModel {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Highest number of calls in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisModel for TrackingModel {
    async fn generate(&self, _prompt: &str, _max_output_tokens: u32) -> Result<ModelResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(ModelResponse {
            text: CANNED_ANALYSIS.to_string(),
            model: "tracking".to_string(),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".to_string()),
        })
    }
}

// ─── Builders ────────────────────────────────────────────────

/// Settings with no pauses so tests run fast.
#[allow(dead_code)]
pub fn fast_settings() -> RunSettings {
    RunSettings {
        batch_pause: std::time::Duration::ZERO,
        page_pause: std::time::Duration::ZERO,
        ..RunSettings::default()
    }
}

#[allow(dead_code)]
pub fn orchestrator(
    store: Arc<MemoryStore>,
    lms: Arc<FakeLms>,
    model: Arc<ScriptedModel>,
    settings: RunSettings,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(store, lms, model, settings)
}

/// Pending, visible assignment with no window.
#[allow(dead_code)]
pub fn assignment(classroom_id: &str, course_id: &str, activity_id: &str) -> Activity {
    make_activity(classroom_id, course_id, activity_id, ActivityType::Assignment)
}

/// Pending, visible forum with no window and no cached discussions.
#[allow(dead_code)]
pub fn forum(classroom_id: &str, course_id: &str, activity_id: &str) -> Activity {
    make_activity(classroom_id, course_id, activity_id, ActivityType::Forum)
}

#[allow(dead_code)]
pub fn make_activity(
    classroom_id: &str,
    course_id: &str,
    activity_id: &str,
    activity_type: ActivityType,
) -> Activity {
    let key = ActivityKey {
        classroom_id: classroom_id.to_string(),
        course_id: course_id.to_string(),
        activity_id: activity_id.to_string(),
        activity_type: activity_type.clone(),
    };
    Activity {
        doc_id: key.doc_id(),
        classroom_id: key.classroom_id,
        course_id: key.course_id,
        activity_id: key.activity_id,
        activity_type,
        name: format!("Activity {}", activity_id),
        description: String::new(),
        open_at: None,
        due_at: None,
        visible: true,
        raw_payload: serde_json::json!({
            "submissions": [
                {"userid": 1, "status": "submitted", "grade": "80.0"},
                {"userid": 2, "status": "new"}
            ]
        }),
        needs_analysis: true,
        analysis_count: 0,
        last_synced_at: Utc::now(),
    }
}

#[allow(dead_code)]
pub fn lms_discussion(id: i64, groupid: i64) -> LmsDiscussion {
    LmsDiscussion {
        discussion: id,
        name: format!("Discussion {}", id),
        groupid,
        userid: 100,
        created: 1_700_000_000,
        posts: vec![],
    }
}

#[allow(dead_code)]
pub fn lms_post(id: i64, parent: Option<i64>, author: i64, role: Option<&str>, message: &str) -> LmsPost {
    LmsPost {
        id,
        parentid: parent,
        subject: format!("Re: post {}", id),
        message: message.to_string(),
        timecreated: 1_700_000_000 + id,
        author: LmsAuthor {
            id: author,
            fullname: format!("User {}", author),
            role: role.map(str::to_string),
        },
        attachments: vec![],
    }
}

/// Seed `count` pending assignments with distinct due dates.
#[allow(dead_code)]
pub async fn seed_assignments(store: &MemoryStore, classroom_id: &str, count: usize) {
    let base: DateTime<Utc> = Utc::now() + Duration::days(30);
    for i in 0..count {
        let mut activity = assignment(classroom_id, "101", &format!("{}", 1_000 + i));
        activity.due_at = Some(base + Duration::minutes(i as i64));
        store.upsert_activity(&activity).await.unwrap();
    }
}
