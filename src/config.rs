// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is resolved and validated once at startup; handlers read the
//! resulting [`Config`] from shared state instead of looking settings up
//! per call.

use crate::middleware::auth::AuthUser;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_DECORATOR_MESSAGE: &str = "This page requires Withings integration.";

/// Message shown to users who have not linked a Withings account.
#[derive(Clone)]
pub enum IntegrationMessage {
    /// Fixed text.
    Text(String),
    /// Computed from the current (possibly anonymous) user.
    Dynamic(Arc<dyn Fn(Option<&AuthUser>) -> String + Send + Sync>),
}

impl IntegrationMessage {
    /// Resolve the message for the given user.
    pub fn render(&self, user: Option<&AuthUser>) -> String {
        match self {
            IntegrationMessage::Text(text) => text.clone(),
            IntegrationMessage::Dynamic(f) => f(user),
        }
    }
}

impl fmt::Debug for IntegrationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationMessage::Text(text) => f.debug_tuple("Text").field(text).finish(),
            IntegrationMessage::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Withings OAuth client ID
    pub withings_client_id: String,
    /// Withings OAuth client secret
    pub withings_client_secret: String,
    /// JWT signing key for host-issued session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// sqlx connection URL
    pub database_url: String,
    /// Server port
    pub port: u16,
    /// Externally visible base URL (scheme + host), used for OAuth and
    /// notification callbacks. Derived from the Host header when unset.
    pub public_url: Option<String>,
    /// Where to go after a successful link
    pub login_redirect: String,
    /// Where to go after unlinking
    pub logout_redirect: String,
    /// Register provider push notifications on link
    pub subscribe: bool,
    /// HTML file rendered by the error page; built-in page when unset
    pub error_template: Option<PathBuf>,
    /// Warning for pages that need integration
    pub integration_message: IntegrationMessage,
}

impl Config {
    /// Default config for tests.
    pub fn test_default() -> Self {
        Self {
            withings_client_id: "test_client_id".to_string(),
            withings_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            database_url: "sqlite::memory:".to_string(),
            port: 8080,
            public_url: Some("http://testserver".to_string()),
            login_redirect: "/".to_string(),
            logout_redirect: "/".to_string(),
            subscribe: false,
            error_template: None,
            integration_message: IntegrationMessage::Text(DEFAULT_DECORATOR_MESSAGE.to_string()),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            None => 8080,
        };

        let subscribe = match optional("WITHINGS_SUBSCRIBE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid("WITHINGS_SUBSCRIBE", raw))?,
            None => false,
        };

        Ok(Self {
            withings_client_id: required("WITHINGS_CLIENT_ID")?,
            withings_client_secret: required("WITHINGS_CLIENT_SECRET")?,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://withings.db".to_string()),
            port,
            public_url: optional("PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
            login_redirect: optional("WITHINGS_LOGIN_REDIRECT").unwrap_or_else(|| "/".to_string()),
            logout_redirect: optional("WITHINGS_LOGOUT_REDIRECT")
                .unwrap_or_else(|| "/".to_string()),
            subscribe,
            error_template: optional("WITHINGS_ERROR_TEMPLATE").map(PathBuf::from),
            integration_message: IntegrationMessage::Text(
                optional("WITHINGS_DECORATOR_MESSAGE")
                    .unwrap_or_else(|| DEFAULT_DECORATOR_MESSAGE.to_string()),
            ),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
