// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings notification callbacks.
//!
//! Withings probes the callback URL with HEAD when a subscription is
//! created, then POSTs a form naming the Withings user whose data changed.

use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::services::sync::handle_notification;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/notification/{appli}",
        post(receive).head(probe).fallback(not_found),
    )
}

/// Notification form body. `startdate`/`enddate` are only logged; fetching
/// uses the stored `last_update`. The form's `appli` repeats the path
/// segment and is not read.
#[derive(Debug, Deserialize)]
pub struct NotificationForm {
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub startdate: Option<String>,
    #[serde(default)]
    pub enddate: Option<String>,
}

/// Subscription probe.
async fn probe() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Handle a measurement-changed notification.
async fn receive(
    State(state): State<Arc<AppState>>,
    Path(appli): Path<String>,
    form: std::result::Result<Form<NotificationForm>, FormRejection>,
) -> StatusCode {
    let Ok(appli) = appli.parse::<i32>() else {
        tracing::warn!(appli = %appli, "Notification for invalid appli");
        return StatusCode::NOT_FOUND;
    };

    let Form(form) = match form {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, appli, "Malformed notification");
            return StatusCode::NOT_FOUND;
        }
    };

    let Some(withings_user_id) = form
        .userid
        .as_deref()
        .and_then(|id| id.trim().parse::<i64>().ok())
    else {
        tracing::warn!(appli, "Notification without a valid userid");
        return StatusCode::NOT_FOUND;
    };

    tracing::info!(
        withings_user_id,
        appli,
        startdate = ?form.startdate,
        enddate = ?form.enddate,
        "Received Withings notification"
    );

    match handle_notification(&state, withings_user_id).await {
        Ok(summary) => {
            tracing::debug!(
                withings_user_id,
                matched = summary.matched,
                synced = summary.synced,
                failed = summary.failed,
                "Notification handled"
            );
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            tracing::error!(error = %e, withings_user_id, "Failed to handle notification");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
