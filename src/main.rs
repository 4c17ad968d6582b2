// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! LMS Insights batch runner
//!
//! Usage:
//!   lms-insights [pending]                  analyze every pending activity
//!   lms-insights classroom <id> [course]    analyze one classroom (or course)
//!   lms-insights filter '<json filters>'    analyze activities matching filters
//!   lms-insights list ['<json filters>']    list activities a run would pick up
//!   lms-insights stats                      print store counters
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use lms_insights::{
    config::Config,
    db::FirestoreDb,
    models::{RunFilters, RunSummary},
    services::{AnalysisOrchestrator, AnthropicClient, LmsClient, RunSettings},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        project = %config.gcp_project_id,
        classrooms = config.lms_endpoints.len(),
        model = %config.model_name,
        "Starting LMS Insights"
    );

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let lms = LmsClient::new(config.lms_endpoints.clone())?;
    let model = AnthropicClient::new(&config)?;

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(db),
        Arc::new(lms),
        Arc::new(model),
        RunSettings::from(&config),
    );

    match command {
        Command::Pending => finish(orchestrator.run_pending_analyses().await),
        Command::Classroom {
            classroom_id,
            course_id,
        } => finish(
            orchestrator
                .run_for_classroom(&classroom_id, course_id.as_deref())
                .await,
        ),
        Command::Filter(filters) => finish(orchestrator.run_for_filters(filters).await),
        Command::List(filters) => {
            let activities = orchestrator.list_available_activities(filters).await?;
            println!("{}", serde_json::to_string_pretty(&activities)?);
            Ok(())
        }
        Command::Stats => {
            let stats = orchestrator.get_analysis_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

enum Command {
    Pending,
    Classroom {
        classroom_id: String,
        course_id: Option<String>,
    },
    Filter(RunFilters),
    List(Option<RunFilters>),
    Stats,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let arg = |idx: usize| args.get(idx).map(String::as_str);

        match arg(0) {
            None | Some("pending") => Ok(Command::Pending),
            Some("classroom") => {
                let classroom_id = arg(1).ok_or("usage: classroom <id> [course]")?;
                Ok(Command::Classroom {
                    classroom_id: classroom_id.to_string(),
                    course_id: arg(2).map(str::to_string),
                })
            }
            Some("filter") => {
                let raw = arg(1).ok_or("usage: filter '<json filters>'")?;
                Ok(Command::Filter(parse_filters(raw)?))
            }
            Some("list") => Ok(Command::List(arg(1).map(parse_filters).transpose()?)),
            Some("stats") => Ok(Command::Stats),
            Some(other) => Err(format!("unknown command: {}", other)),
        }
    }
}

fn parse_filters(raw: &str) -> Result<RunFilters, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid filters: {}", e))
}

/// Print the run summary and fail the process if the run did not complete.
fn finish(summary: RunSummary) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lms_insights=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
