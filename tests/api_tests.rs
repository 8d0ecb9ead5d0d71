// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the measurement and integration-status API.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use withings_link::config::{Config, IntegrationMessage, DEFAULT_DECORATOR_MESSAGE};
use withings_link::middleware::auth::AuthUser;
use withings_link::middleware::integration::WARNING_HEADER;
use withings_link::services::oauth::on_user_authenticated;

mod common;

use common::{get_as, insert_credential, link_account, Call};

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _, _) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_api_rejects_invalid_token() {
    let (app, _, _) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/measures")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_measures_lists_groups_with_derived_values() {
    let (app, state, _) = common::create_test_app().await;
    link_account(&app, &state, 1, "abc").await;

    let response = get_as(&app, "/api/measures", 1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;

    let groups = json["groups"].as_array().unwrap();
    let grpids: Vec<i64> = groups.iter().map(|g| g["grpid"].as_i64().unwrap()).collect();
    // Newest first
    assert_eq!(grpids, vec![2909, 2910, 2908]);

    let weigh_in = &groups[0];
    assert_eq!(weigh_in["category_label"], "Real measurements");
    assert_eq!(weigh_in["attrib_label"], "Captured by a device, not ambiguous");
    assert_eq!(weigh_in["summary"], "2023-11-14: Real measurements");
    assert_eq!(weigh_in["date"], "2023-11-14T19:26:40Z");
    assert_eq!(weigh_in["updatetime"], "2023-11-14T22:13:20Z");
    assert_eq!(weigh_in["measures"][0]["label"], "Weight (kg)");
    assert_eq!(weigh_in["measures"][0]["value"], 79300);
    assert_eq!(weigh_in["measures"][0]["unit"], -3);
    assert_eq!(weigh_in["measures"][0]["derived"].as_f64(), Some(79.3));

    assert_eq!(groups[1]["measures"].as_array().unwrap().len(), 3);
    assert_eq!(groups[2]["attrib_label"], "Manually entered by user");
    assert_eq!(groups[2]["measures"][0]["derived"].as_f64(), Some(1.73));

    assert!(json["last_update"].is_string());
}

#[tokio::test]
async fn test_measures_are_scoped_to_user() {
    let (app, state, _) = common::create_test_app().await;
    link_account(&app, &state, 1, "abc").await;

    let response = get_as(&app, "/api/measures", 2).await;
    let json = json_body(response).await;

    assert!(json["groups"].as_array().unwrap().is_empty());
    assert!(json["last_update"].is_null());
}

#[tokio::test]
async fn test_integration_warns_when_not_linked() {
    let (app, _, _) = common::create_test_app().await;

    let response = get_as(&app, "/api/integration", 1).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(WARNING_HEADER).unwrap(),
        DEFAULT_DECORATOR_MESSAGE
    );

    let json = json_body(response).await;
    assert_eq!(json["integrated"], false);
    assert_eq!(json["guard"]["decision"], "warn");
    assert_eq!(json["guard"]["message"], DEFAULT_DECORATOR_MESSAGE);
}

#[tokio::test]
async fn test_integration_passes_when_linked() {
    let (app, state, _) = common::create_test_app().await;
    link_account(&app, &state, 1, "abc").await;

    let response = get_as(&app, "/api/integration", 1).await;

    assert!(response.headers().get(WARNING_HEADER).is_none());
    let json = json_body(response).await;
    assert_eq!(json["integrated"], true);
    assert_eq!(json["guard"]["decision"], "pass");
    assert!(json["profile"].is_object());
}

#[tokio::test]
async fn test_integration_uses_dynamic_message() {
    let config = Config {
        integration_message: IntegrationMessage::Dynamic(Arc::new(
            |user: Option<&AuthUser>| match user {
                Some(user) => format!("User {} should link Withings", user.user_id),
                None => "Please log in".to_string(),
            },
        )),
        ..Config::test_default()
    };
    let (app, _, _) = common::create_test_app_with_config(config).await;

    let response = get_as(&app, "/api/integration", 7).await;

    assert_eq!(
        response.headers().get(WARNING_HEADER).unwrap(),
        "User 7 should link Withings"
    );
}

#[tokio::test]
async fn test_login_hook_refreshes_profile() {
    let (_, state, provider) = common::create_test_app().await;
    insert_credential(&state, 1, Some(Utc::now() + Duration::hours(3)), None).await;

    on_user_authenticated(&state, 1).await;
    on_user_authenticated(&state, 2).await;

    assert!(state.sessions.get(1).profile.is_some());
    assert!(state.sessions.get(2).profile.is_none());
    assert_eq!(provider.calls(), vec![Call::Profile("access-1".to_string())]);
}
