// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings API client.
//!
//! Handles:
//! - OAuth2 authorization URL and code exchange
//! - Access token refresh
//! - Measurement retrieval (paginated)
//! - Notification subscriptions
//!
//! The rest of the crate talks to Withings through the [`ProviderClient`]
//! trait so tests can substitute a mock.

use crate::error::AppError;
use crate::models::{Attribution, Category, MeasureType};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

const API_BASE_URL: &str = "https://wbsapi.withings.net";
const AUTHORIZE_URL: &str = "https://account.withings.com/oauth2_user/authorize2";
const OAUTH_SCOPES: &str = "user.info,user.metrics";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const STATE_NONCE_BYTES: usize = 24;

/// Withings status code for an invalid or expired access token.
const STATUS_INVALID_TOKEN: i64 = 401;

/// Operations the integration needs from the provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Build the authorize URL for a new OAuth request.
    fn request_authorization(&self, callback_url: &str)
        -> Result<AuthorizationRequest, AppError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str, callback_url: &str) -> Result<TokenGrant, AppError>;

    /// Get a new access token from a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;

    /// Fetch the user's profile. Opaque to us; only stashed in session.
    async fn get_profile(&self, access_token: &str) -> Result<serde_json::Value, AppError>;

    /// Fetch measure groups updated after `since`, or the full history.
    async fn get_measures(
        &self,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<MeasurePayload, AppError>;

    /// Register a notification callback for an application type.
    async fn subscribe(
        &self,
        access_token: &str,
        callback_url: &str,
        appli: i32,
        comment: &str,
    ) -> Result<(), AppError>;

    /// List notification callbacks registered for an application type.
    async fn list_subscriptions(
        &self,
        access_token: &str,
        appli: i32,
    ) -> Result<Vec<Subscription>, AppError>;

    /// Remove a notification callback.
    async fn unsubscribe(
        &self,
        access_token: &str,
        callback_url: &str,
        appli: i32,
    ) -> Result<(), AppError>;
}

/// Start of an OAuth2 authorization: where to send the user, and the
/// `state` nonce the callback must echo back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token response from the Withings OAuth2 endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub userid: Option<i64>,
}

impl TokenGrant {
    /// Absolute expiry of the access token, counted from `issued_at`.
    ///
    /// A lifetime chrono cannot represent is treated as already expired,
    /// so the next provider call refreshes the token.
    pub fn expiry(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::try_seconds(self.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(issued_at)
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Withings sends numeric IDs as strings on some endpoints.
fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Int(id)) => Ok(Some(id)),
        Some(RawId::Str(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Measurement payload: one provider update time plus ordered groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurePayload {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updatetime: DateTime<Utc>,
    #[serde(default)]
    pub measuregrps: Vec<ProviderMeasureGroup>,
}

/// A measure group as reported by Withings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMeasureGroup {
    pub grpid: i64,
    pub attrib: Attribution,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub category: Category,
    #[serde(default)]
    pub measures: Vec<ProviderMeasure>,
}

/// One (value, type, unit) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMeasure {
    pub value: i64,
    #[serde(rename = "type")]
    pub measure_type: MeasureType,
    pub unit: i32,
}

/// A registered notification callback.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub callbackurl: String,
    pub appli: i32,
}

/// Standard Withings response envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    status: i64,
    body: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// One page of `getmeas` results.
#[derive(Deserialize)]
struct MeasurePage {
    #[serde(with = "chrono::serde::ts_seconds")]
    updatetime: DateTime<Utc>,
    #[serde(default)]
    measuregrps: Vec<ProviderMeasureGroup>,
    #[serde(default)]
    more: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    profiles: Vec<Subscription>,
}

/// Withings API client.
#[derive(Clone)]
pub struct WithingsClient {
    http: reqwest::Client,
    api_base_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    rng: SystemRandom,
}

impl WithingsClient {
    /// Create a new Withings client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            api_base_url: API_BASE_URL.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            client_id,
            client_secret,
            rng: SystemRandom::new(),
        })
    }

    fn generate_state(&self) -> Result<String, AppError> {
        let mut nonce = [0u8; STATE_NONCE_BYTES];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to generate OAuth state")))?;
        Ok(URL_SAFE_NO_PAD.encode(nonce))
    }

    /// POST a form to an API path and unwrap the response envelope.
    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: Option<&str>,
        form: &[(&str, String)],
    ) -> Result<Option<T>, AppError> {
        let url = format!("{}/{}", self.api_base_url, path);

        let mut request = self.http.post(&url).form(form);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ProviderApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderApi(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| AppError::ProviderApi(format!("JSON parse error: {}", e)))?;

        match envelope.status {
            0 => Ok(envelope.body),
            STATUS_INVALID_TOKEN => Err(AppError::ProviderApi(
                AppError::PROVIDER_TOKEN_ERROR.to_string(),
            )),
            status => Err(AppError::ProviderApi(format!(
                "status {}: {}",
                status,
                envelope.error.unwrap_or_default()
            ))),
        }
    }

    async fn post_form_body<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: Option<&str>,
        form: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.post_form(path, access_token, form)
            .await?
            .ok_or_else(|| AppError::ProviderApi(format!("Empty response body from {}", path)))
    }
}

#[async_trait]
impl ProviderClient for WithingsClient {
    fn request_authorization(
        &self,
        callback_url: &str,
    ) -> Result<AuthorizationRequest, AppError> {
        let state = self.generate_state()?;

        let url = format!(
            "{}?\
             response_type=code&\
             client_id={}&\
             scope={}&\
             redirect_uri={}&\
             state={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(OAUTH_SCOPES),
            urlencoding::encode(callback_url),
            state
        );

        Ok(AuthorizationRequest { url, state })
    }

    async fn exchange_code(&self, code: &str, callback_url: &str) -> Result<TokenGrant, AppError> {
        self.post_form_body(
            "v2/oauth2",
            None,
            &[
                ("action", "requesttoken".to_string()),
                ("grant_type", "authorization_code".to_string()),
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
                ("code", code.to_string()),
                ("redirect_uri", callback_url.to_string()),
            ],
        )
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        self.post_form_body(
            "v2/oauth2",
            None,
            &[
                ("action", "requesttoken".to_string()),
                ("grant_type", "refresh_token".to_string()),
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
                ("refresh_token", refresh_token.to_string()),
            ],
        )
        .await
    }

    async fn get_profile(&self, access_token: &str) -> Result<serde_json::Value, AppError> {
        self.post_form_body(
            "v2/user",
            Some(access_token),
            &[("action", "getdevice".to_string())],
        )
        .await
    }

    async fn get_measures(
        &self,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<MeasurePayload, AppError> {
        let mut offset = 0i64;
        let mut updatetime = None;
        let mut measuregrps = Vec::new();

        loop {
            let mut form = vec![("action", "getmeas".to_string())];
            if let Some(since) = since {
                form.push(("lastupdate", since.timestamp().to_string()));
            }
            if offset > 0 {
                form.push(("offset", offset.to_string()));
            }

            let page: MeasurePage = self.post_form_body("measure", Some(access_token), &form).await?;
            updatetime.get_or_insert(page.updatetime);
            measuregrps.extend(page.measuregrps);

            if page.more == 0 || page.offset <= offset {
                break;
            }
            offset = page.offset;
        }

        Ok(MeasurePayload {
            updatetime: updatetime.unwrap_or_else(Utc::now),
            measuregrps,
        })
    }

    async fn subscribe(
        &self,
        access_token: &str,
        callback_url: &str,
        appli: i32,
        comment: &str,
    ) -> Result<(), AppError> {
        self.post_form::<serde_json::Value>(
            "notify",
            Some(access_token),
            &[
                ("action", "subscribe".to_string()),
                ("callbackurl", callback_url.to_string()),
                ("appli", appli.to_string()),
                ("comment", comment.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        access_token: &str,
        appli: i32,
    ) -> Result<Vec<Subscription>, AppError> {
        let list: Option<SubscriptionList> = self
            .post_form(
                "notify",
                Some(access_token),
                &[
                    ("action", "list".to_string()),
                    ("appli", appli.to_string()),
                ],
            )
            .await?;
        Ok(list.map(|l| l.profiles).unwrap_or_default())
    }

    async fn unsubscribe(
        &self,
        access_token: &str,
        callback_url: &str,
        appli: i32,
    ) -> Result<(), AppError> {
        self.post_form::<serde_json::Value>(
            "notify",
            Some(access_token),
            &[
                ("action", "revoke".to_string()),
                ("callbackurl", callback_url.to_string()),
                ("appli", appli.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}
