// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use withings_link::config::Config;
use withings_link::db::Database;
use withings_link::error::AppError;
use withings_link::middleware::auth::{create_jwt, SESSION_COOKIE};
use withings_link::models::Credential;
use withings_link::routes::create_router;
use withings_link::services::withings::{AuthorizationRequest, Subscription, TokenGrant};
use withings_link::services::{MeasurePayload, ProviderClient, SessionStore};
use withings_link::AppState;

/// Withings user ID the mock provider grants tokens for.
#[allow(dead_code)]
pub const WITHINGS_USER_ID: i64 = 12345;

/// Provider calls recorded by [`MockProvider`].
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Authorize,
    Exchange(String),
    Refresh(String),
    Profile(String),
    Measures {
        token: String,
        since: Option<DateTime<Utc>>,
    },
    Subscribe {
        url: String,
        appli: i32,
    },
    ListSubscriptions(i32),
    Unsubscribe {
        url: String,
        appli: i32,
    },
}

/// In-memory stand-in for the Withings API.
pub struct MockProvider {
    pub calls: Mutex<Vec<Call>>,
    pub payload: Mutex<MeasurePayload>,
    pub subscriptions: Mutex<Vec<Subscription>>,
    pub fail_exchange: AtomicBool,
    pub fail_measures: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    /// Access tokens Withings answers with status 401.
    pub revoked_tokens: Mutex<Vec<String>>,
    pub expires_in: AtomicI64,
    nonce: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            payload: Mutex::new(sample_payload()),
            subscriptions: Mutex::new(Vec::new()),
            fail_exchange: AtomicBool::new(false),
            fail_measures: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            revoked_tokens: Mutex::new(Vec::new()),
            expires_in: AtomicI64::new(10800),
            nonce: AtomicUsize::new(0),
        }
    }
}

#[allow(dead_code)]
impl MockProvider {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_payload(&self, payload: MeasurePayload) {
        *self.payload.lock().unwrap() = payload;
    }

    pub fn revoke_token(&self, access_token: &str) {
        self.revoked_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
    }

    fn grant(&self, access_token: String, refresh_token: &str) -> TokenGrant {
        TokenGrant {
            access_token,
            refresh_token: refresh_token.to_string(),
            expires_in: self.expires_in.load(Ordering::SeqCst),
            token_type: "Bearer".to_string(),
            userid: Some(WITHINGS_USER_ID),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn request_authorization(&self, callback_url: &str) -> Result<AuthorizationRequest, AppError> {
        self.record(Call::Authorize);
        let state = format!("nonce-{}", self.nonce.fetch_add(1, Ordering::SeqCst));
        Ok(AuthorizationRequest {
            url: format!(
                "https://account.withings.com/oauth2_user/authorize2?state={}&redirect_uri={}",
                state,
                urlencoding::encode(callback_url)
            ),
            state,
        })
    }

    async fn exchange_code(&self, code: &str, _callback_url: &str) -> Result<TokenGrant, AppError> {
        self.record(Call::Exchange(code.to_string()));
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AppError::ProviderApi("invalid_grant".to_string()));
        }
        Ok(self.grant(format!("access-{}", code), &format!("refresh-{}", code)))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        self.record(Call::Refresh(refresh_token.to_string()));
        Ok(self.grant("access-refreshed".to_string(), "refresh-refreshed"))
    }

    async fn get_profile(&self, access_token: &str) -> Result<serde_json::Value, AppError> {
        self.record(Call::Profile(access_token.to_string()));
        Ok(json!({ "devices": [{ "type": "Scale", "model": "Body+" }] }))
    }

    async fn get_measures(
        &self,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<MeasurePayload, AppError> {
        self.record(Call::Measures {
            token: access_token.to_string(),
            since,
        });
        if self.fail_measures.load(Ordering::SeqCst) {
            return Err(AppError::ProviderApi("service unavailable".to_string()));
        }
        if self
            .revoked_tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == access_token)
        {
            return Err(AppError::ProviderApi(
                AppError::PROVIDER_TOKEN_ERROR.to_string(),
            ));
        }
        Ok(self.payload.lock().unwrap().clone())
    }

    async fn subscribe(
        &self,
        _access_token: &str,
        callback_url: &str,
        appli: i32,
        _comment: &str,
    ) -> Result<(), AppError> {
        self.record(Call::Subscribe {
            url: callback_url.to_string(),
            appli,
        });
        self.subscriptions.lock().unwrap().push(Subscription {
            callbackurl: callback_url.to_string(),
            appli,
        });
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        _access_token: &str,
        appli: i32,
    ) -> Result<Vec<Subscription>, AppError> {
        self.record(Call::ListSubscriptions(appli));
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.appli == appli)
            .cloned()
            .collect())
    }

    async fn unsubscribe(
        &self,
        _access_token: &str,
        callback_url: &str,
        appli: i32,
    ) -> Result<(), AppError> {
        self.record(Call::Unsubscribe {
            url: callback_url.to_string(),
            appli,
        });
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(AppError::ProviderApi("unsubscribe failed".to_string()));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|s| !(s.appli == appli && s.callbackurl == callback_url));
        Ok(())
    }
}

/// Three groups (2909, 2910, 2908) holding 1, 3 and 1 measures.
pub fn sample_payload() -> MeasurePayload {
    serde_json::from_value(json!({
        "updatetime": 1_700_000_000,
        "measuregrps": [
            {
                "grpid": 2909,
                "attrib": 0,
                "date": 1_699_990_000,
                "category": 1,
                "measures": [{ "value": 79300, "type": 1, "unit": -3 }]
            },
            {
                "grpid": 2910,
                "attrib": 0,
                "date": 1_699_980_000,
                "category": 1,
                "measures": [
                    { "value": 80, "type": 9, "unit": 0 },
                    { "value": 120, "type": 10, "unit": 0 },
                    { "value": 62, "type": 11, "unit": 0 }
                ]
            },
            {
                "grpid": 2908,
                "attrib": 2,
                "date": 1_699_970_000,
                "category": 1,
                "measures": [{ "value": 173, "type": 4, "unit": -2 }]
            }
        ]
    }))
    .expect("sample payload should deserialize")
}

/// An empty payload (nothing changed since the last fetch).
#[allow(dead_code)]
pub fn empty_payload() -> MeasurePayload {
    serde_json::from_value(json!({ "updatetime": 1_700_000_100, "measuregrps": [] }))
        .expect("empty payload should deserialize")
}

/// Create a test app with an in-memory database and a mock provider.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MockProvider>) {
    create_test_app_with_config(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_config(
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<MockProvider>) {
    let db = Database::in_memory()
        .await
        .expect("Failed to open in-memory database");
    let provider = Arc::new(MockProvider::default());

    let state = Arc::new(AppState {
        config,
        db,
        provider: provider.clone(),
        sessions: SessionStore::new(),
    });

    (create_router(state.clone()), state, provider)
}

/// Cookie header value authenticating `user_id`.
#[allow(dead_code)]
pub fn session_cookie(user_id: i64) -> String {
    let key = Config::test_default().jwt_signing_key;
    let token = create_jwt(user_id, &key).expect("Failed to create JWT");
    format!("{}={}", SESSION_COOKIE, token)
}

/// Issue an authenticated GET.
#[allow(dead_code)]
pub async fn get_as(app: &axum::Router, uri: &str, user_id: i64) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::COOKIE, session_cookie(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Location header of a redirect.
#[allow(dead_code)]
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Run `/login` then `/complete` for `user_id` with a valid state.
#[allow(dead_code)]
pub async fn link_account(app: &axum::Router, state: &AppState, user_id: i64, code: &str) -> Response {
    let response = get_as(app, "/login", user_id).await;
    assert!(response.status().is_redirection());

    let nonce = state
        .sessions
        .get(user_id)
        .oauth_state
        .expect("login should store the OAuth state");

    get_as(
        app,
        &format!(
            "/complete?code={}&state={}&userid={}",
            code, nonce, WITHINGS_USER_ID
        ),
        user_id,
    )
    .await
}

/// Store a credential directly, bypassing the OAuth flow.
#[allow(dead_code)]
pub async fn insert_credential(
    state: &AppState,
    user_id: i64,
    token_expiry: Option<DateTime<Utc>>,
    last_update: Option<DateTime<Utc>>,
) -> Credential {
    let credential = Credential {
        user_id,
        withings_user_id: WITHINGS_USER_ID,
        access_token: format!("access-{}", user_id),
        refresh_token: format!("refresh-{}", user_id),
        token_type: "Bearer".to_string(),
        token_expiry,
        last_update,
    };
    state
        .db
        .upsert_credential(&credential)
        .await
        .expect("Failed to store credential");
    credential
}
