// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement ingestion.
//!
//! Turns a Withings measurement payload into stored groups and measures.
//! Ingestion is idempotent per (user, grpid): groups already stored are
//! skipped, so notifications can be redelivered and history re-fetched
//! safely.

use crate::db::Database;
use crate::error::AppError;
use crate::services::withings::MeasurePayload;
use serde::Serialize;

/// What one ingestion run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub groups_created: usize,
    pub measures_created: usize,
    pub groups_skipped: usize,
}

/// Store every new group in `payload` for `user_id`, in payload order.
pub async fn ingest(
    db: &Database,
    user_id: i64,
    payload: &MeasurePayload,
) -> Result<IngestSummary, AppError> {
    let mut summary = IngestSummary::default();

    for group in &payload.measuregrps {
        if db.measure_group_exists(user_id, group.grpid).await? {
            summary.groups_skipped += 1;
            continue;
        }

        match db
            .insert_measure_group(user_id, group, payload.updatetime)
            .await
        {
            Ok(written) => {
                summary.groups_created += 1;
                summary.measures_created += written;
            }
            // Lost a race with a concurrent ingest of the same group
            Err(AppError::DuplicateGroup { grpid, .. }) => {
                tracing::debug!(user_id, grpid, "Measure group stored concurrently, skipping");
                summary.groups_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        user_id,
        groups_created = summary.groups_created,
        measures_created = summary.measures_created,
        groups_skipped = summary.groups_skipped,
        "Measurements ingested"
    );

    Ok(summary)
}
