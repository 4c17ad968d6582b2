// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same ordering and cursor semantics as Firestore.

use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use crate::db::AnalysisStore;
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityKey, ActivityQuery, AnalysisKey, AnalysisResult, AnalysisStats, PageCursor,
};

/// In-memory store keyed by document id.
#[derive(Default)]
pub struct MemoryStore {
    activities: DashMap<String, Activity>,
    analyses: DashMap<String, AnalysisResult>,
    page_queries: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable database: every operation fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Number of page queries served so far.
    pub fn page_queries(&self) -> usize {
        self.page_queries.load(AtomicOrdering::SeqCst)
    }

    /// Number of stored analysis records.
    pub fn analysis_count(&self) -> usize {
        self.analyses.len()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(AppError::Database(
                "Database not connected (offline mode)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sort order shared with the Firestore query. `None` due dates sort first.
fn page_order(a: &PageCursor, b: &PageCursor) -> Ordering {
    a.due_at
        .cmp(&b.due_at)
        .then_with(|| b.last_synced_at.cmp(&a.last_synced_at))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn fetch_activity_page(
        &self,
        query: &ActivityQuery,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> Result<Vec<Activity>> {
        self.check_online()?;
        self.page_queries.fetch_add(1, AtomicOrdering::SeqCst);

        let mut matching: Vec<Activity> = self
            .activities
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .filter(|entry| {
                after.is_none_or(|cursor| {
                    page_order(&PageCursor::after(entry.value()), cursor) == Ordering::Greater
                })
            })
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| page_order(&PageCursor::after(a), &PageCursor::after(b)));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn get_activity(&self, key: &ActivityKey) -> Result<Option<Activity>> {
        self.check_online()?;
        Ok(self.activities.get(&key.doc_id()).map(|a| a.clone()))
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        self.check_online()?;
        self.activities
            .insert(activity.doc_id.clone(), activity.clone());
        Ok(())
    }

    async fn get_analysis(&self, key: &AnalysisKey) -> Result<Option<AnalysisResult>> {
        self.check_online()?;
        Ok(self.analyses.get(&key.doc_id()).map(|a| a.clone()))
    }

    async fn save_analysis(
        &self,
        result: &AnalysisResult,
        completed: Option<&ActivityKey>,
    ) -> Result<()> {
        self.check_online()?;

        if let Some(key) = completed {
            let doc_id = key.doc_id();
            let mut activity = self
                .activities
                .get_mut(&doc_id)
                .ok_or_else(|| AppError::NotFound(format!("Activity {}", doc_id)))?;
            self.analyses.insert(result.doc_id.clone(), result.clone());
            activity.needs_analysis = false;
            activity.analysis_count += 1;
        } else {
            self.analyses.insert(result.doc_id.clone(), result.clone());
        }
        Ok(())
    }

    async fn analysis_stats(&self) -> Result<AnalysisStats> {
        self.check_online()?;

        let mut analyses_by_type: HashMap<String, u64> = HashMap::new();
        for entry in self.analyses.iter() {
            *analyses_by_type
                .entry(entry.value().key.activity_type.to_string())
                .or_insert(0) += 1;
        }

        Ok(AnalysisStats {
            total_activities: self.activities.len() as u64,
            pending_activities: self
                .activities
                .iter()
                .filter(|a| a.value().needs_analysis)
                .count() as u64,
            total_analyses: self.analyses.len() as u64,
            analyses_by_type,
        })
    }
}
