// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analysis persistence.
//!
//! Builds [`AnalysisResult`] records and writes them through the store.
//! Saving an activity analysis also clears the activity's pending flag in
//! the same write; group analyses leave the activity untouched.

use chrono::Utc;
use std::sync::Arc;

use crate::db::AnalysisStore;
use crate::error::Result;
use crate::models::{
    Activity, AnalysisKey, AnalysisResult, EnrichedPayload, ModelResponseMeta, ParsedAnalysis,
};

/// Writes analyses for processed activities.
#[derive(Clone)]
pub struct AnalysisRepository {
    store: Arc<dyn AnalysisStore>,
}

impl AnalysisRepository {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    /// Upsert the activity's analysis and mark the activity as analyzed.
    pub async fn save(
        &self,
        activity: &Activity,
        parsed: ParsedAnalysis,
        payload: EnrichedPayload,
        meta: ModelResponseMeta,
    ) -> Result<AnalysisResult> {
        let activity_key = activity.key();
        let result = build_result(
            AnalysisKey::for_activity(&activity_key),
            activity,
            parsed,
            payload,
            meta,
        );

        self.store.save_analysis(&result, Some(&activity_key)).await?;

        tracing::info!(
            doc_id = %result.doc_id,
            insights = result.insights.len(),
            alerts = result.alerts.len(),
            "Analysis saved"
        );
        Ok(result)
    }

    /// Upsert a per-group forum analysis. The activity record is not touched.
    pub async fn save_group(
        &self,
        activity: &Activity,
        group_id: i64,
        parsed: ParsedAnalysis,
        payload: EnrichedPayload,
        meta: ModelResponseMeta,
    ) -> Result<AnalysisResult> {
        let result = build_result(
            AnalysisKey::for_group(&activity.key(), group_id),
            activity,
            parsed,
            payload,
            meta,
        );

        self.store.save_analysis(&result, None).await?;

        tracing::debug!(doc_id = %result.doc_id, group_id, "Group analysis saved");
        Ok(result)
    }
}

fn build_result(
    key: AnalysisKey,
    activity: &Activity,
    parsed: ParsedAnalysis,
    payload: EnrichedPayload,
    meta: ModelResponseMeta,
) -> AnalysisResult {
    AnalysisResult {
        doc_id: key.doc_id(),
        key,
        classroom_id: activity.classroom_id.clone(),
        course_id: activity.course_id.clone(),
        activity_name: activity.name.clone(),
        summary: parsed.summary,
        insights: parsed.insights,
        alerts: parsed.alerts,
        recommendations: parsed.recommendations,
        full_analysis: parsed.full_analysis,
        sections: parsed.sections,
        input_payload: payload,
        model_response: meta,
        last_updated: Utc::now(),
        is_valid: true,
    }
}
