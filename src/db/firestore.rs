// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Activities (synced LMS coursework, keyed by composite identity)
//! - Analyses (model output, upserted by composite identity)

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::db::{collections, AnalysisStore};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityKey, ActivityQuery, ActivityType, AnalysisKey, AnalysisResult,
    AnalysisStats, PageCursor,
};

/// Row shape returned by aggregation queries.
#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Count documents in a collection, optionally restricted to one field value.
    async fn count(
        &self,
        collection: &str,
        field_eq: Option<(&'static str, firestore::FirestoreValue)>,
    ) -> Result<u64> {
        let select = self.get_client()?.fluent().select().from(collection);

        let rows: Vec<CountRow> = match field_eq {
            Some((field, value)) => {
                select
                    .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
                    .aggregate(|a| a.fields([a.field("count").count()]))
                    .obj()
                    .query()
                    .await
            }
            None => {
                select
                    .aggregate(|a| a.fields([a.field("count").count()]))
                    .obj()
                    .query()
                    .await
            }
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }
}

#[async_trait]
impl AnalysisStore for FirestoreDb {
    // ─── Activity Operations ─────────────────────────────────────

    async fn fetch_activity_page(
        &self,
        query: &ActivityQuery,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> Result<Vec<Activity>> {
        let filter_query = query.clone();

        let select = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                let query = &filter_query;
                q.for_all([
                    q.field("visible").eq(true),
                    query
                        .only_pending
                        .then(|| q.field("needs_analysis").eq(true))
                        .flatten(),
                    query
                        .classroom_id
                        .as_ref()
                        .and_then(|id| q.field("classroom_id").eq(id.clone())),
                    query
                        .course_id
                        .as_ref()
                        .and_then(|id| q.field("course_id").eq(id.clone())),
                    query
                        .activity_type
                        .as_ref()
                        .and_then(|t| q.field("activity_type").eq(t.as_str().to_string())),
                    (!query.activity_ids.is_empty())
                        .then(|| q.field("activity_id").is_in(query.activity_ids.clone()))
                        .flatten(),
                ])
            })
            .order_by([
                ("due_at", firestore::FirestoreQueryDirection::Ascending),
                ("last_synced_at", firestore::FirestoreQueryDirection::Descending),
                ("doc_id", firestore::FirestoreQueryDirection::Ascending),
            ]);

        let select = match after {
            // Timestamps must compare as timestamps, like the stored fields
            Some(cursor) => select.start_at(firestore::FirestoreQueryCursor::AfterValue(vec![
                cursor.due_at.map(firestore::FirestoreTimestamp).into(),
                firestore::FirestoreTimestamp(cursor.last_synced_at).into(),
                (&cursor.doc_id).into(),
            ])),
            None => select,
        };

        select
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_activity(&self, key: &ActivityKey) -> Result<Option<Activity>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&key.doc_id())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(&activity.doc_id)
            .object(activity)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Analysis Operations ─────────────────────────────────────

    async fn get_analysis(&self, key: &AnalysisKey) -> Result<Option<AnalysisResult>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ANALYSES)
            .obj()
            .one(&key.doc_id())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Upsert the analysis and, for a completed activity, flip its flag.
    ///
    /// Both writes go through one transaction so the flag never clears
    /// without the analysis being stored. The activity is read inside the
    /// transaction and only `needs_analysis` and `analysis_count` are
    /// written back; fields owned by the sync job are left as they are.
    async fn save_analysis(
        &self,
        result: &AnalysisResult,
        completed: Option<&ActivityKey>,
    ) -> Result<()> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let activity = match completed {
            Some(key) => {
                let doc_id = key.doc_id();
                let in_transaction = client.clone_with_consistency_selector(
                    firestore::FirestoreConsistencySelector::Transaction(
                        transaction.transaction_id().clone(),
                    ),
                );
                let current: Option<Activity> = in_transaction
                    .fluent()
                    .select()
                    .by_id_in(collections::ACTIVITIES)
                    .obj()
                    .one(&doc_id)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                match current {
                    Some(activity) => Some(activity),
                    None => {
                        let _ = transaction.rollback().await;
                        return Err(AppError::NotFound(format!(
                            "Activity {} not found",
                            doc_id
                        )));
                    }
                }
            }
            None => None,
        };

        client
            .fluent()
            .update()
            .in_col(collections::ANALYSES)
            .document_id(&result.doc_id)
            .object(result)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add analysis to transaction: {}", e))
            })?;

        if let Some(mut activity) = activity {
            activity.needs_analysis = false;
            activity.analysis_count += 1;

            client
                .fluent()
                .update()
                .fields(firestore::paths!(Activity::{needs_analysis, analysis_count}))
                .in_col(collections::ACTIVITIES)
                .document_id(&activity.doc_id)
                .object(&activity)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add activity to transaction: {}", e))
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(doc_id = %result.doc_id, "Analysis upserted");
        Ok(())
    }

    async fn analysis_stats(&self) -> Result<AnalysisStats> {
        let total_activities = self.count(collections::ACTIVITIES, None).await?;
        let pending_activities = self
            .count(
                collections::ACTIVITIES,
                Some(("needs_analysis", true.into())),
            )
            .await?;
        let total_analyses = self.count(collections::ANALYSES, None).await?;

        let mut analyses_by_type = HashMap::new();
        let mut typed = 0;
        for activity_type in [ActivityType::Assignment, ActivityType::Forum] {
            let count = self
                .count(
                    collections::ANALYSES,
                    Some(("key.activity_type", activity_type.as_str().into())),
                )
                .await?;
            typed += count;
            analyses_by_type.insert(activity_type.to_string(), count);
        }
        analyses_by_type.insert("other".to_string(), total_analyses.saturating_sub(typed));

        Ok(AnalysisStats {
            total_activities,
            pending_activities,
            total_analyses,
            analyses_by_type,
        })
    }
}
