// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - analysis pipeline components.

pub mod enrichment;
pub mod lms;
pub mod model;
pub mod optimizer;
pub mod orchestrator;
pub mod parser;
pub mod persistence;
pub mod prompt;

pub use enrichment::ContentEnricher;
pub use lms::{ContentSource, LmsClient};
pub use model::{AnalysisModel, AnthropicClient, ModelResponse};
pub use optimizer::PayloadOptimizer;
pub use orchestrator::{AnalysisOrchestrator, RunSettings};
pub use parser::parse_analysis;
pub use persistence::AnalysisRepository;
pub use prompt::build_prompt;
