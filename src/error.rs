// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("OAuth session state missing or does not match")]
    SessionStateMissing,

    #[error("Missing callback parameter: {0}")]
    CallbackParameterMissing(&'static str),

    #[error("Credential exchange failed: {0}")]
    CredentialExchangeFailed(String),

    #[error("Measure group {grpid} already stored for user {user_id}")]
    DuplicateGroup { user_id: i64, grpid: i64 },

    #[error("Withings API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when the provider rejects our access token.
    pub const PROVIDER_TOKEN_ERROR: &'static str = "Token expired or invalid";

    /// Check whether this error means the stored access token is unusable.
    pub fn is_provider_token_error(&self) -> bool {
        matches!(self, AppError::ProviderApi(msg) if msg == Self::PROVIDER_TOKEN_ERROR)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::SessionStateMissing => {
                (StatusCode::BAD_REQUEST, "session_state_missing", None)
            }
            AppError::CallbackParameterMissing(name) => (
                StatusCode::BAD_REQUEST,
                "callback_parameter_missing",
                Some(name.to_string()),
            ),
            AppError::CredentialExchangeFailed(msg) => {
                tracing::warn!(error = %msg, "Credential exchange failed");
                (StatusCode::BAD_GATEWAY, "credential_exchange_failed", None)
            }
            AppError::DuplicateGroup { .. } => (StatusCode::CONFLICT, "duplicate_group", None),
            AppError::ProviderApi(msg) => {
                (StatusCode::BAD_GATEWAY, "withings_error", Some(msg.clone()))
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
