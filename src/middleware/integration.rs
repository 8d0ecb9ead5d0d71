// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration warning middleware.
//!
//! Wraps routes that want the user to have linked Withings. The wrapped
//! handler always runs; it finds the [`GuardDecision`] in the request
//! extensions, and the response gets an `X-Integration-Warning` header when
//! the user is not integrated.

use crate::middleware::auth::AuthUser;
use crate::services::integration::{check_integration, GuardDecision};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const WARNING_HEADER: &str = "X-Integration-Warning";

/// Attach a [`GuardDecision`] for the current user.
pub async fn warn_if_not_integrated(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = request.extensions().get::<AuthUser>().cloned();

    let decision = match check_integration(
        &state.db,
        user.as_ref(),
        &state.config.integration_message,
        None,
    )
    .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, "Integration check failed, letting request through");
            GuardDecision::Pass
        }
    };

    request.extensions_mut().insert(decision.clone());
    let mut response = next.run(request).await;

    if let GuardDecision::Warn(message) = decision {
        if let Ok(value) = HeaderValue::from_str(&message) {
            response.headers_mut().insert(WARNING_HEADER, value);
        }
    }

    response
}
