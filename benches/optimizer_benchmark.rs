use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use lms_insights::models::payload::{
    Discussion, DiscussionStats, ForumPayload, ForumStats, Post,
};
use lms_insights::models::{EnrichedPayload, RawSource};
use lms_insights::services::{parse_analysis, PayloadOptimizer};
use std::hint::black_box;

/// Forum with `discussions` threads of `posts` long posts each.
fn large_forum(discussions: i64, posts: i64) -> EnrichedPayload {
    let discussions = (0..discussions)
        .map(|d| Discussion {
            id: d,
            name: format!("Discussion {}", d),
            group_id: None,
            author_id: 1,
            created_at: None,
            posts: (0..posts)
                .map(|p| Post {
                    id: d * 1_000 + p,
                    parent_id: (p > 0).then_some(d * 1_000 + p - 1),
                    author_id: p % 40,
                    author_role: None,
                    subject: format!("Re: {}", p),
                    message: "Lorem ipsum dolor sit amet. ".repeat(300),
                    created_at: None,
                    attachments: vec![],
                })
                .collect(),
            stats: DiscussionStats::default(),
        })
        .collect();

    EnrichedPayload::Forum(ForumPayload {
        discussions,
        stats: ForumStats::default(),
        raw: RawSource::Inline(serde_json::json!({"blob": "x".repeat(100_000)})),
    })
}

fn benchmark_optimizer(c: &mut Criterion) {
    let optimizer = PayloadOptimizer::default();
    let over_budget = large_forum(10, 120);
    let within_budget = large_forum(1, 5);

    let mut group = c.benchmark_group("payload_optimizer");

    group.bench_function("over_budget_forum", |b| {
        b.iter_batched(
            || over_budget.clone(),
            |payload| optimizer.optimize(black_box(payload)),
            BatchSize::LargeInput,
        )
    });

    group.bench_function("within_budget_forum", |b| {
        b.iter_batched(
            || within_budget.clone(),
            |payload| optimizer.optimize(black_box(payload)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn benchmark_parser(c: &mut Criterion) {
    let markdown: String = (0..8)
        .map(|i| {
            format!(
                "## Dimension {i}\n\
                 - **Multiple students** contributed effectively in round {i}.\n\
                 - **Low participation** from the evening section in round {i}.\n\
                 | Metric | Value |\n|---|---|\n| posts | {i} |\n\
                 **Suggested action:** Follow up on round {i}.\n\n"
            )
        })
        .collect();

    c.bench_function("parse_analysis", |b| {
        b.iter(|| parse_analysis(black_box(&markdown)))
    });
}

criterion_group!(benches, benchmark_optimizer, benchmark_parser);
criterion_main!(benches);
