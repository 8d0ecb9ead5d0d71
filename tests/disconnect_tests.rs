// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for unlinking a Withings account.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use std::sync::atomic::Ordering;
use withings_link::config::Config;

mod common;

use common::{get_as, insert_credential, link_account, location, Call};

fn subscribing_config() -> Config {
    Config {
        subscribe: true,
        logout_redirect: "/goodbye".to_string(),
        ..Config::test_default()
    }
}

#[tokio::test]
async fn test_disconnect_deletes_credential() {
    let (app, state, provider) = common::create_test_app().await;
    link_account(&app, &state, 1, "abc").await;
    assert!(state.sessions.get(1).profile.is_some());
    provider.clear_calls();

    let response = get_as(&app, "/logout?next=/bye", 1).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/bye");
    assert!(state.db.get_credential(1).await.unwrap().is_none());
    assert!(state.sessions.get(1).profile.is_none());
    assert!(state.sessions.is_empty());

    // Subscriptions disabled: Withings is never contacted
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_without_credential_succeeds() {
    let (app, _, _) = common::create_test_app_with_config(subscribing_config()).await;

    let response = get_as(&app, "/logout", 1).await;

    assert_eq!(location(&response), "/goodbye");
}

#[tokio::test]
async fn test_disconnect_revokes_subscriptions() {
    let (app, state, provider) = common::create_test_app_with_config(subscribing_config()).await;
    link_account(&app, &state, 1, "abc").await;
    assert_eq!(provider.subscriptions.lock().unwrap().len(), 2);
    provider.clear_calls();

    let response = get_as(&app, "/logout", 1).await;

    assert_eq!(location(&response), "/goodbye");
    assert!(state.db.get_credential(1).await.unwrap().is_none());
    assert!(provider.subscriptions.lock().unwrap().is_empty());

    let calls = provider.calls();
    assert!(calls.contains(&Call::Unsubscribe {
        url: "http://testserver/notification/1".to_string(),
        appli: 1,
    }));
    assert!(calls.contains(&Call::Unsubscribe {
        url: "http://testserver/notification/4".to_string(),
        appli: 4,
    }));
}

#[tokio::test]
async fn test_disconnect_keeps_foreign_subscriptions() {
    let (app, state, provider) = common::create_test_app_with_config(subscribing_config()).await;
    insert_credential(&state, 1, Some(Utc::now() + Duration::hours(3)), None).await;
    provider
        .subscriptions
        .lock()
        .unwrap()
        .push(withings_link::services::withings::Subscription {
            callbackurl: "https://other.example.com/hook".to_string(),
            appli: 1,
        });

    let response = get_as(&app, "/logout", 1).await;

    assert_eq!(location(&response), "/goodbye");
    assert!(!provider
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Unsubscribe { .. })));
    assert_eq!(provider.subscriptions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_unsubscribe_keeps_credential() {
    let (app, state, provider) = common::create_test_app_with_config(subscribing_config()).await;
    link_account(&app, &state, 1, "abc").await;
    provider.fail_unsubscribe.store(true, Ordering::SeqCst);

    let response = get_as(&app, "/logout", 1).await;

    assert_eq!(location(&response), "/error");
    assert!(state.db.get_credential(1).await.unwrap().is_some());
    assert!(state.sessions.get(1).profile.is_some());
}

#[tokio::test]
async fn test_disconnect_refreshes_expired_token_before_unsubscribing() {
    let (app, state, provider) = common::create_test_app_with_config(subscribing_config()).await;
    insert_credential(&state, 1, Some(Utc::now() - Duration::minutes(1)), None).await;

    let response = get_as(&app, "/logout", 1).await;

    assert_eq!(location(&response), "/goodbye");
    let calls = provider.calls();
    assert_eq!(calls.first(), Some(&Call::Refresh("refresh-1".to_string())));
    assert!(state.db.get_credential(1).await.unwrap().is_none());
}
