// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The pipeline talks to storage only through [`AnalysisStore`]. Firestore is
//! the production backend; [`MemoryStore`] keeps the same query semantics
//! in-process.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Activity, ActivityKey, ActivityQuery, AnalysisKey, AnalysisResult, AnalysisStats, PageCursor,
};

/// Collection names as constants.
pub mod collections {
    pub const ACTIVITIES: &str = "activities";
    pub const ANALYSES: &str = "activity_analyses";
}

/// Storage operations used by the analysis pipeline.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Fetch one page of activities matching `query`, strictly after `after`.
    ///
    /// Ordered by due date ascending, last sync descending, document id.
    async fn fetch_activity_page(
        &self,
        query: &ActivityQuery,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> Result<Vec<Activity>>;

    async fn get_activity(&self, key: &ActivityKey) -> Result<Option<Activity>>;

    /// Create or replace an activity record (used by the sync job and tests).
    async fn upsert_activity(&self, activity: &Activity) -> Result<()>;

    async fn get_analysis(&self, key: &AnalysisKey) -> Result<Option<AnalysisResult>>;

    /// Upsert an analysis keyed by its composite identity.
    ///
    /// When `completed` is given, the activity's `needs_analysis` flag is
    /// cleared and its `analysis_count` incremented in the same write. The
    /// flag is never touched if the upsert fails.
    async fn save_analysis(
        &self,
        result: &AnalysisResult,
        completed: Option<&ActivityKey>,
    ) -> Result<()>;

    async fn analysis_stats(&self) -> Result<AnalysisStats>;
}
