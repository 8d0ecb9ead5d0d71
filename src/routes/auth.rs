// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings account linking routes.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, Redirect},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::routes::base_url;
use crate::services::oauth::{self, CallbackParams};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login))
        .route("/complete", get(complete))
        .route("/logout", get(logout))
        .route("/error", get(error_page))
}

/// Optional post-flow redirect.
#[derive(Deserialize)]
pub struct NextParams {
    #[serde(default)]
    next: Option<String>,
}

/// Start linking - redirect to Withings authorization.
async fn login(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<NextParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let base = base_url(&state.config, &headers);
    let authorize_url = oauth::begin(&state, user.user_id, &base, params.next)?;
    Ok(Redirect::temporary(&authorize_url))
}

/// Withings redirects here after the user approves (or denies) access.
async fn complete(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Redirect {
    let base = base_url(&state.config, &headers);
    let outcome = oauth::complete(&state, user.user_id, &params, &base).await;
    Redirect::temporary(outcome.redirect_target())
}

/// Unlink the Withings account.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<NextParams>,
    headers: HeaderMap,
) -> Redirect {
    let base = base_url(&state.config, &headers);
    let outcome = oauth::disconnect(&state, user.user_id, params.next, &base).await;
    Redirect::temporary(outcome.redirect_target())
}

const DEFAULT_ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Withings error</title></head>
<body>
<h1>Something went wrong</h1>
<p>We could not complete the request to Withings. Please try again later.</p>
</body>
</html>
"#;

/// Error page all failed flows land on.
async fn error_page(State(state): State<Arc<AppState>>) -> Html<String> {
    if let Some(path) = &state.config.error_template {
        match tokio::fs::read_to_string(path).await {
            Ok(page) => return Html(page),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read error template");
            }
        }
    }

    Html(DEFAULT_ERROR_PAGE.to_string())
}
