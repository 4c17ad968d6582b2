// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod analysis;
pub mod payload;
pub mod run;

pub use activity::{Activity, ActivityKey, ActivityType};
pub use analysis::{
    AnalysisKey, AnalysisResult, AnalysisSection, ModelResponseMeta, ParsedAnalysis,
    SectionFormat,
};
pub use payload::{EnrichedPayload, RawSource};
pub use run::{
    ActivityQuery, ActivitySummary, AnalysisStats, PageCursor, RunFilters, RunSummary,
};
