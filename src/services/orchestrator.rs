// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Batch analysis orchestration.
//!
//! Handles the run workflow:
//! 1. Fetch a page of candidate activities (keyset pagination)
//! 2. Drop activities outside their open/close window
//! 3. Process the rest in small concurrent batches:
//!    enrich, optimize, prompt, generate, parse, save
//! 4. Pause between batches and pages to stay under upstream rate limits
//!
//! Per-activity failures are recorded in the run summary and never abort the
//! run. A failed activity keeps its pending flag and is retried by the next
//! run. Every entry point returns a value; nothing here panics on bad input.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::db::AnalysisStore;
use crate::error::{AppError, Result};
use crate::models::payload::ForumPayload;
use crate::models::{
    Activity, ActivityQuery, ActivitySummary, AnalysisStats, EnrichedPayload, ModelResponseMeta,
    PageCursor, ParsedAnalysis, RawSource, RunFilters, RunSummary,
};
use crate::services::enrichment::{forum_stats, ContentEnricher};
use crate::services::lms::ContentSource;
use crate::services::model::AnalysisModel;
use crate::services::optimizer::{serialized_size, PayloadOptimizer};
use crate::services::parser::parse_analysis;
use crate::services::persistence::AnalysisRepository;
use crate::services::prompt::build_prompt;

/// Maximum explicit activity ids accepted by a filtered run.
pub const MAX_ACTIVITY_IDS: usize = 30;

const GROUP_RAW_NOTE: &str = "Raw LMS payload is stored with the activity analysis";

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub page_size: u32,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub page_pause: Duration,
    pub payload_budget_bytes: usize,
    pub max_output_tokens: u32,
    pub forum_group_analysis: bool,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause(),
            page_pause: config.page_pause(),
            payload_budget_bytes: config.payload_budget_bytes,
            max_output_tokens: config.model_max_output_tokens,
            forum_group_analysis: config.forum_group_analysis,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome of one successfully analyzed activity.
#[derive(Debug, Default)]
struct ActivityReport {
    group_analyses: usize,
    group_errors: Vec<String>,
}

/// Drives analysis runs over the activity store.
pub struct AnalysisOrchestrator {
    store: Arc<dyn AnalysisStore>,
    enricher: ContentEnricher,
    model: Arc<dyn AnalysisModel>,
    repository: AnalysisRepository,
    optimizer: PayloadOptimizer,
    settings: RunSettings,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        lms: Arc<dyn ContentSource>,
        model: Arc<dyn AnalysisModel>,
        settings: RunSettings,
    ) -> Self {
        Self {
            enricher: ContentEnricher::new(lms),
            repository: AnalysisRepository::new(store.clone()),
            optimizer: PayloadOptimizer::new(settings.payload_budget_bytes),
            store,
            model,
            settings,
        }
    }

    /// Analyze every pending, visible, open activity.
    pub async fn run_pending_analyses(&self) -> RunSummary {
        tracing::info!("Starting pending analysis run");
        self.run(ActivityQuery::pending()).await
    }

    /// Analyze pending activities of one classroom, optionally one course.
    pub async fn run_for_classroom(
        &self,
        classroom_id: &str,
        course_id: Option<&str>,
    ) -> RunSummary {
        tracing::info!(classroom_id, course_id = ?course_id, "Starting classroom analysis run");
        self.run(ActivityQuery {
            classroom_id: Some(classroom_id.to_string()),
            course_id: course_id.map(str::to_string),
            ..ActivityQuery::pending()
        })
        .await
    }

    /// Analyze activities matching explicit filters.
    ///
    /// `force_reanalysis` drops the pending predicate so already analyzed
    /// activities are analyzed again.
    pub async fn run_for_filters(&self, filters: RunFilters) -> RunSummary {
        if let Err(e) = validate_filters(&filters) {
            tracing::warn!(error = %e, "Rejected filtered run");
            return RunSummary {
                success: false,
                errors: vec![e.to_string()],
                ..RunSummary::default()
            };
        }

        tracing::info!(filters = ?filters, "Starting filtered analysis run");
        self.run(ActivityQuery::from(&filters)).await
    }

    /// List activities a run with these filters would pick up.
    ///
    /// Without filters, lists pending activities.
    pub async fn list_available_activities(
        &self,
        filters: Option<RunFilters>,
    ) -> Result<Vec<ActivitySummary>> {
        let query = match filters {
            Some(filters) => {
                validate_filters(&filters)?;
                ActivityQuery::from(&filters)
            }
            None => ActivityQuery::pending(),
        };

        let now = Utc::now();
        let mut available = Vec::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .store
                .fetch_activity_page(&query, cursor.as_ref(), self.settings.page_size)
                .await?;
            let Some(last) = page.last() else { break };
            cursor = Some(PageCursor::after(last));
            let exhausted = page.len() < self.settings.page_size as usize;

            available.extend(
                page.iter()
                    .filter(|a| a.is_open_at(now))
                    .map(ActivitySummary::from),
            );

            if exhausted {
                break;
            }
        }

        Ok(available)
    }

    /// Store-wide counters.
    pub async fn get_analysis_stats(&self) -> Result<AnalysisStats> {
        self.store.analysis_stats().await
    }

    async fn run(&self, query: ActivityQuery) -> RunSummary {
        let start = Instant::now();
        let now = Utc::now();
        let page_size = self.settings.page_size;
        let mut summary = RunSummary {
            success: true,
            ..RunSummary::default()
        };
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = match self
                .store
                .fetch_activity_page(&query, cursor.as_ref(), page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(error = %e, pages = summary.pages, "Failed to fetch activity page");
                    summary.success = false;
                    summary
                        .errors
                        .push(format!("Failed to fetch activities: {}", e));
                    break;
                }
            };

            let Some(last) = page.last() else { break };
            cursor = Some(PageCursor::after(last));
            summary.pages += 1;
            let exhausted = page.len() < page_size as usize;

            self.process_page(page, now, &mut summary).await;

            if exhausted {
                break;
            }
            pause(self.settings.page_pause).await;
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            success = summary.success,
            processed = summary.processed,
            generated = summary.generated,
            group_analyses = summary.group_analyses,
            skipped = summary.skipped,
            pages = summary.pages,
            errors = summary.errors.len(),
            duration_ms = summary.duration_ms,
            "Analysis run complete"
        );
        summary
    }

    async fn process_page(&self, page: Vec<Activity>, now: DateTime<Utc>, summary: &mut RunSummary) {
        let (open, closed): (Vec<Activity>, Vec<Activity>) =
            page.into_iter().partition(|a| a.is_open_at(now));

        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "Skipping activities outside their window");
            summary.skipped += closed.len();
        }

        for (idx, batch) in open.chunks(self.settings.batch_size).enumerate() {
            if idx > 0 {
                pause(self.settings.batch_pause).await;
            }

            let outcomes = join_all(batch.iter().map(|a| self.process_activity(a))).await;

            for (activity, outcome) in batch.iter().zip(outcomes) {
                summary.processed += 1;
                match outcome {
                    Ok(report) => {
                        summary.generated += 1;
                        summary.group_analyses += report.group_analyses;
                        summary.errors.extend(report.group_errors);
                    }
                    Err(e) => {
                        let message = e.with_activity(&activity.key());
                        if e.is_rate_limited() {
                            tracing::warn!(error = %message, "Rate limited, activity left pending");
                        } else {
                            tracing::error!(error = %message, "Activity analysis failed");
                        }
                        summary.errors.push(message);
                    }
                }
            }
        }
    }

    async fn process_activity(&self, activity: &Activity) -> Result<ActivityReport> {
        let start = Instant::now();
        tracing::info!(
            classroom_id = %activity.classroom_id,
            course_id = %activity.course_id,
            activity_id = %activity.activity_id,
            activity_type = %activity.activity_type,
            "Analyzing activity"
        );

        let payload = self.enricher.enrich(activity).await?;
        let groups = if self.settings.forum_group_analysis {
            group_partitions(&payload)
        } else {
            Vec::new()
        };

        let payload = self.optimizer.optimize(payload);
        let (parsed, meta) = self.analyze(activity, &payload).await?;
        self.repository.save(activity, parsed, payload, meta).await?;

        let mut report = ActivityReport::default();
        for (group_id, group_payload) in groups {
            match self.analyze_group(activity, group_id, group_payload).await {
                Ok(()) => report.group_analyses += 1,
                Err(e) => {
                    let message = format!("{} (group {})", e.with_activity(&activity.key()), group_id);
                    tracing::warn!(error = %message, "Group analysis failed");
                    report.group_errors.push(message);
                }
            }
        }

        tracing::info!(
            activity_id = %activity.activity_id,
            group_analyses = report.group_analyses,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Activity analyzed"
        );
        Ok(report)
    }

    async fn analyze_group(
        &self,
        activity: &Activity,
        group_id: i64,
        payload: EnrichedPayload,
    ) -> Result<()> {
        let payload = self.optimizer.optimize(payload);
        let (parsed, meta) = self.analyze(activity, &payload).await?;
        self.repository
            .save_group(activity, group_id, parsed, payload, meta)
            .await?;
        Ok(())
    }

    /// Prompt the model and parse its answer.
    async fn analyze(
        &self,
        activity: &Activity,
        payload: &EnrichedPayload,
    ) -> Result<(ParsedAnalysis, ModelResponseMeta)> {
        let prompt = build_prompt(activity, payload);
        let response = self
            .model
            .generate(&prompt, self.settings.max_output_tokens)
            .await?;

        if response.text.trim().is_empty() {
            return Err(AppError::EmptyResponse);
        }

        let parsed = parse_analysis(&response.text);
        let meta = ModelResponseMeta {
            model: response.model,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            stop_reason: response.stop_reason,
            prompt_chars: prompt.chars().count(),
        };
        Ok((parsed, meta))
    }
}

fn validate_filters(filters: &RunFilters) -> Result<()> {
    if filters.activity_ids.len() > MAX_ACTIVITY_IDS {
        return Err(AppError::BadRequest(format!(
            "Too many activity ids: {} (max {})",
            filters.activity_ids.len(),
            MAX_ACTIVITY_IDS
        )));
    }
    Ok(())
}

/// Split a forum payload by discussion group.
///
/// Returns nothing unless discussions span at least two groups. Discussions
/// without a group (or visible to all groups) are not assigned to any group.
pub fn group_partitions(payload: &EnrichedPayload) -> Vec<(i64, EnrichedPayload)> {
    let EnrichedPayload::Forum(forum) = payload else {
        return Vec::new();
    };

    let mut groups: BTreeMap<i64, Vec<_>> = BTreeMap::new();
    for discussion in &forum.discussions {
        if let Some(group_id) = discussion.group_id.filter(|g| *g > 0) {
            groups.entry(group_id).or_default().push(discussion.clone());
        }
    }
    if groups.len() < 2 {
        return Vec::new();
    }

    let raw_size = match &forum.raw {
        RawSource::Inline(value) => serialized_size(value),
        RawSource::Omitted { original_size, .. } => *original_size,
    };

    groups
        .into_iter()
        .map(|(group_id, discussions)| {
            let stats = forum_stats(&discussions);
            let payload = EnrichedPayload::Forum(ForumPayload {
                discussions,
                stats,
                raw: RawSource::Omitted {
                    note: GROUP_RAW_NOTE.to_string(),
                    original_size: raw_size,
                },
            });
            (group_id, payload)
        })
        .collect()
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
