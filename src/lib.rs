// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! LMS Insights: AI-generated analyses of course activities
//!
//! This crate provides the batch pipeline that picks up assignments and
//! discussion forums flagged for analysis, enriches them with content from
//! the LMS, asks a generative model for a structured review and stores the
//! parsed result next to the activity.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
