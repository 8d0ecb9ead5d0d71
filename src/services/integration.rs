// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration checks for pages that need a linked Withings account.

use crate::config::IntegrationMessage;
use crate::db::Database;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use serde::Serialize;

/// Whether a request may proceed silently or should show a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "message", rename_all = "snake_case")]
pub enum GuardDecision {
    Pass,
    Warn(String),
}

/// True if the user is authenticated and has a stored credential.
///
/// The stored tokens are not checked against Withings.
pub async fn is_integrated(db: &Database, user: Option<&AuthUser>) -> Result<bool, AppError> {
    match user {
        Some(user) => Ok(db.get_credential(user.user_id).await?.is_some()),
        None => Ok(false),
    }
}

/// Decide whether to warn the user that the page needs integration.
///
/// `message` overrides the configured default for this check.
pub async fn check_integration(
    db: &Database,
    user: Option<&AuthUser>,
    default_message: &IntegrationMessage,
    message: Option<&IntegrationMessage>,
) -> Result<GuardDecision, AppError> {
    if is_integrated(db, user).await? {
        return Ok(GuardDecision::Pass);
    }

    let message = message.unwrap_or(default_message);
    Ok(GuardDecision::Warn(message.render(user)))
}
