// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings account linking.
//!
//! The OAuth2 authorization-code flow spans two requests:
//!
//! 1. [`begin`] asks the provider for an authorize URL, remembers the
//!    `state` nonce (and an optional post-login redirect) in the user's
//!    session, and sends the user to Withings.
//! 2. [`complete`] runs when Withings redirects back. It consumes the nonce,
//!    exchanges the code for tokens, stores the credential, imports the
//!    user's measurement history and optionally registers notification
//!    callbacks.
//!
//! [`disconnect`] undoes the link. All failures become
//! [`FlowOutcome::Error`], which the routes turn into a redirect to the
//! error page.

use crate::error::AppError;
use crate::models::Credential;
use crate::services::ingest::{ingest, IngestSummary};
use crate::services::sync::fresh_credential;
use crate::AppState;
use chrono::Utc;
use serde::Deserialize;

/// Notification application types we subscribe to: 1 is weight and body
/// composition, 4 is heart rate and blood pressure.
pub const NOTIFY_APPLIS: [i32; 2] = [1, 4];

/// Comment attached to our notification subscriptions.
const SUBSCRIPTION_COMMENT: &str = "withings-link";

/// Path of the error page every failed flow redirects to.
pub const ERROR_PATH: &str = "/error";

/// Result of a flow step.
#[derive(Debug)]
pub enum FlowOutcome {
    /// Redirect to this URL.
    Success(String),
    /// Redirect to the error page.
    Error(AppError),
}

impl FlowOutcome {
    /// Where the user should be sent.
    pub fn redirect_target(&self) -> &str {
        match self {
            FlowOutcome::Success(url) => url,
            FlowOutcome::Error(_) => ERROR_PATH,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Success(_))
    }
}

/// Query parameters Withings sends to the completion URL.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// URL Withings redirects to after authorization.
pub fn callback_url(base_url: &str) -> String {
    format!("{}/complete", base_url)
}

/// URL Withings posts notifications to for one application type.
pub fn notification_url(base_url: &str, appli: i32) -> String {
    format!("{}/notification/{}", base_url, appli)
}

/// Start linking: returns the Withings authorize URL.
pub fn begin(
    state: &AppState,
    user_id: i64,
    base_url: &str,
    next_url: Option<String>,
) -> Result<String, AppError> {
    let request = state
        .provider
        .request_authorization(&callback_url(base_url))?;

    let next_url = next_url.filter(|url| !url.is_empty());
    state
        .sessions
        .start_authorization(user_id, request.state, next_url);

    tracing::info!(user_id, "Starting OAuth flow, redirecting to Withings");
    Ok(request.url)
}

/// Finish linking after Withings redirects back.
pub async fn complete(
    state: &AppState,
    user_id: i64,
    params: &CallbackParams,
    base_url: &str,
) -> FlowOutcome {
    let credential = match exchange(state, user_id, params, base_url).await {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!(error = %e, user_id, "OAuth completion failed");
            return FlowOutcome::Error(e);
        }
    };

    tracing::info!(
        user_id,
        withings_user_id = credential.withings_user_id,
        "OAuth successful, credential stored"
    );

    refresh_profile(state, &credential).await;
    import_history(state, &credential).await;

    if state.config.subscribe {
        subscribe_notifications(state, &credential, base_url).await;
    }

    let next_url = state
        .sessions
        .take_next_url(user_id)
        .unwrap_or_else(|| state.config.login_redirect.clone());

    FlowOutcome::Success(next_url)
}

/// Validate the callback, exchange the code and store the credential.
async fn exchange(
    state: &AppState,
    user_id: i64,
    params: &CallbackParams,
    base_url: &str,
) -> Result<Credential, AppError> {
    let expected_state = state
        .sessions
        .take_oauth_state(user_id)
        .ok_or(AppError::SessionStateMissing)?;

    if let Some(error) = &params.error {
        tracing::warn!(error = %error, user_id, "OAuth error from Withings");
    }

    let code = non_empty(&params.code).ok_or(AppError::CallbackParameterMissing("code"))?;
    let withings_user_id: i64 = non_empty(&params.userid)
        .and_then(|id| id.parse().ok())
        .ok_or(AppError::CallbackParameterMissing("userid"))?;

    match non_empty(&params.state) {
        Some(received) if received == expected_state => {}
        Some(_) => {
            tracing::error!(user_id, "OAuth state mismatch! Potential tampering.");
            return Err(AppError::SessionStateMissing);
        }
        None => return Err(AppError::CallbackParameterMissing("state")),
    }

    let grant = state
        .provider
        .exchange_code(code, &callback_url(base_url))
        .await
        .map_err(|e| AppError::CredentialExchangeFailed(e.to_string()))?;

    if let Some(granted_id) = grant.userid.filter(|id| *id != withings_user_id) {
        tracing::warn!(
            callback_userid = withings_user_id,
            token_userid = granted_id,
            "Withings user ID in token response differs from callback"
        );
    }

    let now = Utc::now();
    let credential = Credential {
        user_id,
        withings_user_id,
        token_expiry: Some(grant.expiry(now)),
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        token_type: grant.token_type,
        last_update: Some(now),
    };

    state.db.upsert_credential(&credential).await?;
    Ok(credential)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Fetch the profile into the session. Best-effort.
async fn refresh_profile(state: &AppState, credential: &Credential) {
    match state.provider.get_profile(&credential.access_token).await {
        Ok(profile) => state.sessions.set_profile(credential.user_id, profile),
        Err(e) => {
            tracing::warn!(error = %e, user_id = credential.user_id, "Failed to fetch Withings profile");
        }
    }
}

/// Pull the full measurement history for a freshly linked account.
///
/// On failure `last_update` is cleared so the next notification fetches
/// the full history again instead of only what changed since now.
async fn import_history(state: &AppState, credential: &Credential) {
    let result: Result<IngestSummary, AppError> = async {
        let payload = state
            .provider
            .get_measures(&credential.access_token, None)
            .await?;
        ingest(&state.db, credential.user_id, &payload).await
    }
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, user_id = credential.user_id, "Failed to import measurement history");
        if let Err(e) = state.db.set_last_update(credential.user_id, None).await {
            tracing::error!(error = %e, user_id = credential.user_id, "Failed to reset last update");
        }
    }
}

/// Register our notification URLs. Failures are only logged.
async fn subscribe_notifications(state: &AppState, credential: &Credential, base_url: &str) {
    for appli in NOTIFY_APPLIS {
        let url = notification_url(base_url, appli);
        match state
            .provider
            .subscribe(&credential.access_token, &url, appli, SUBSCRIPTION_COMMENT)
            .await
        {
            Ok(()) => tracing::info!(user_id = credential.user_id, appli, "Subscribed to notifications"),
            Err(e) => tracing::warn!(
                error = %e,
                user_id = credential.user_id,
                appli,
                "Failed to subscribe to notifications"
            ),
        }
    }
}

/// Forget the user's Withings link.
///
/// With subscriptions enabled our notification callbacks are revoked first;
/// if that fails the credential is kept and the outcome is an error.
pub async fn disconnect(
    state: &AppState,
    user_id: i64,
    next_url: Option<String>,
    base_url: &str,
) -> FlowOutcome {
    if let Err(e) = unlink(state, user_id, base_url).await {
        tracing::warn!(error = %e, user_id, "Failed to disconnect Withings account");
        return FlowOutcome::Error(e);
    }

    let next_url = next_url
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| state.config.logout_redirect.clone());
    FlowOutcome::Success(next_url)
}

async fn unlink(state: &AppState, user_id: i64, base_url: &str) -> Result<(), AppError> {
    if state.config.subscribe {
        if let Some(credential) = state.db.get_credential(user_id).await? {
            unsubscribe_notifications(state, credential, base_url).await?;
        }
    }

    if state.db.delete_credential(user_id).await? {
        tracing::info!(user_id, "Withings credential deleted");
    }
    state.sessions.clear_profile(user_id);
    Ok(())
}

async fn unsubscribe_notifications(
    state: &AppState,
    credential: Credential,
    base_url: &str,
) -> Result<(), AppError> {
    let credential = fresh_credential(state, credential).await?;

    for appli in NOTIFY_APPLIS {
        let url = notification_url(base_url, appli);
        let subscriptions = state
            .provider
            .list_subscriptions(&credential.access_token, appli)
            .await?;

        if subscriptions.iter().any(|s| s.callbackurl == url) {
            state
                .provider
                .unsubscribe(&credential.access_token, &url, appli)
                .await?;
            tracing::info!(user_id = credential.user_id, appli, "Unsubscribed from notifications");
        }
    }

    Ok(())
}

/// Hook for the host application to call right after it logs a user in.
///
/// Refreshes the Withings profile in the session when the user has linked
/// an account. Never fails; problems are logged.
pub async fn on_user_authenticated(state: &AppState, user_id: i64) {
    let credential = match state.db.get_credential(user_id).await {
        Ok(Some(credential)) => credential,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, user_id, "Failed to load credential after login");
            return;
        }
    };

    match fresh_credential(state, credential).await {
        Ok(credential) => refresh_profile(state, &credential).await,
        Err(e) => tracing::warn!(error = %e, user_id, "Failed to refresh token after login"),
    }
}
