// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::middleware::warn_if_not_integrated;
use crate::models::{Measure, MeasureGroup};
use crate::services::GuardDecision;
use crate::AppState;
use axum::{
    extract::State,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().route("/api/measures", get(get_measures)).route(
        "/api/integration",
        get(get_integration)
            .route_layer(middleware::from_fn_with_state(state, warn_if_not_integrated)),
    )
}

// ─── Measurements ────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MeasureResponse {
    #[serde(rename = "type")]
    pub measure_type: i64,
    pub label: &'static str,
    pub value: i64,
    pub unit: i32,
    /// `value * 10^unit`
    pub derived: f64,
}

impl From<&Measure> for MeasureResponse {
    fn from(measure: &Measure) -> Self {
        Self {
            measure_type: measure.measure_type.code(),
            label: measure.measure_type.label(),
            value: measure.value,
            unit: measure.unit,
            derived: measure.get_value(),
        }
    }
}

/// API timestamps: whole seconds, `Z` suffix.
fn api_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Serialize)]
pub struct MeasureGroupResponse {
    pub grpid: i64,
    pub summary: String,
    pub date: String,
    pub updatetime: String,
    pub attrib: i64,
    pub attrib_label: &'static str,
    pub category: i64,
    pub category_label: &'static str,
    pub measures: Vec<MeasureResponse>,
}

impl From<&MeasureGroup> for MeasureGroupResponse {
    fn from(group: &MeasureGroup) -> Self {
        Self {
            grpid: group.grpid,
            summary: group.to_string(),
            date: api_timestamp(group.date),
            updatetime: api_timestamp(group.updatetime),
            attrib: group.attrib.code(),
            attrib_label: group.attrib.label(),
            category: group.category.code(),
            category_label: group.category.label(),
            measures: group.measures.iter().map(MeasureResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeasuresResponse {
    pub groups: Vec<MeasureGroupResponse>,
    pub last_update: Option<String>,
}

/// Stored measure groups for the current user, newest first.
async fn get_measures(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeasuresResponse>> {
    let groups = state.db.list_measure_groups(user.user_id).await?;
    let last_update = state
        .db
        .get_credential(user.user_id)
        .await?
        .and_then(|c| c.last_update)
        .map(api_timestamp);

    Ok(Json(MeasuresResponse {
        groups: groups.iter().map(MeasureGroupResponse::from).collect(),
        last_update,
    }))
}

// ─── Integration Status ──────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct IntegrationResponse {
    pub integrated: bool,
    pub guard: GuardDecision,
    pub profile: Option<serde_json::Value>,
}

/// Integration status; the guard middleware supplies the decision.
async fn get_integration(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Extension(guard): Extension<GuardDecision>,
) -> Json<IntegrationResponse> {
    Json(IntegrationResponse {
        integrated: guard == GuardDecision::Pass,
        guard,
        profile: state.sessions.get(user.user_id).profile,
    })
}
