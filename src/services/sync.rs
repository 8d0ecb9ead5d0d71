// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement sync for linked accounts.
//!
//! Used by the notification endpoint: Withings tells us a user has new
//! data, we pull everything since the credential's `last_update` and ingest
//! it.

use crate::error::AppError;
use crate::models::Credential;
use crate::services::ingest::{ingest, IngestSummary};
use crate::AppState;
use chrono::Utc;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Outcome of handling one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    pub matched: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Return a credential whose access token is usable, refreshing and
/// persisting new tokens if it expires soon.
pub async fn fresh_credential(
    state: &AppState,
    credential: Credential,
) -> Result<Credential, AppError> {
    if !credential.expires_within(Utc::now(), TOKEN_REFRESH_MARGIN_SECS) {
        return Ok(credential);
    }

    tracing::info!(user_id = credential.user_id, "Access token expired, refreshing");
    refresh_credential(state, credential).await
}

/// Refresh the access token unconditionally and persist the new tokens.
async fn refresh_credential(
    state: &AppState,
    credential: Credential,
) -> Result<Credential, AppError> {
    let now = Utc::now();
    let grant = state.provider.refresh_token(&credential.refresh_token).await?;
    let refreshed = Credential {
        token_expiry: Some(grant.expiry(now)),
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        token_type: grant.token_type,
        ..credential
    };

    state.db.upsert_credential(&refreshed).await?;
    tracing::info!(user_id = refreshed.user_id, "Token refreshed");

    Ok(refreshed)
}

/// Fetch and ingest everything new for one credential, then move its
/// `last_update` forward.
pub async fn sync_credential(
    state: &AppState,
    credential: Credential,
) -> Result<IngestSummary, AppError> {
    let mut credential = fresh_credential(state, credential).await?;
    let fetched_at = Utc::now();

    // A rejected token is refreshed and the fetch retried once.
    let payload = match state
        .provider
        .get_measures(&credential.access_token, credential.last_update)
        .await
    {
        Err(e) if e.is_provider_token_error() => {
            tracing::warn!(user_id = credential.user_id, "Access token rejected, refreshing");
            credential = refresh_credential(state, credential).await?;
            state
                .provider
                .get_measures(&credential.access_token, credential.last_update)
                .await?
        }
        result => result?,
    };
    let summary = ingest(&state.db, credential.user_id, &payload).await?;

    state
        .db
        .set_last_update(credential.user_id, Some(fetched_at))
        .await?;

    Ok(summary)
}

/// Sync every local user linked to `withings_user_id`.
///
/// A failure for one user is logged and does not stop the others.
pub async fn handle_notification(
    state: &AppState,
    withings_user_id: i64,
) -> Result<NotificationSummary, AppError> {
    let credentials = state
        .db
        .credentials_for_withings_user(withings_user_id)
        .await?;

    let mut summary = NotificationSummary {
        matched: credentials.len(),
        ..Default::default()
    };

    if credentials.is_empty() {
        tracing::info!(withings_user_id, "Notification for unknown Withings user");
        return Ok(summary);
    }

    for credential in credentials {
        let user_id = credential.user_id;
        match sync_credential(state, credential).await {
            Ok(ingested) => {
                summary.synced += 1;
                tracing::debug!(
                    user_id,
                    withings_user_id,
                    groups_created = ingested.groups_created,
                    "Notification sync complete"
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(
                    error = %e,
                    user_id,
                    withings_user_id,
                    "Failed to sync measurements for notification"
                );
            }
        }
    }

    Ok(summary)
}
