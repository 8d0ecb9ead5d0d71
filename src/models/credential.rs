//! Withings credential model for storage.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// OAuth credentials linking one local user to one Withings account.
///
/// Stored in `withings_credentials`, unique on `user_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    /// Local (host application) user ID
    pub user_id: i64,
    /// Withings-assigned user ID
    pub withings_user_id: i64,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    /// Usually "Bearer"
    pub token_type: String,
    /// When the access token expires (None if the provider didn't say)
    pub token_expiry: Option<DateTime<Utc>>,
    /// Last successful measurement fetch
    pub last_update: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the access token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        match self.token_expiry {
            Some(expiry) => now + chrono::Duration::seconds(margin_secs) >= expiry,
            None => false,
        }
    }
}
