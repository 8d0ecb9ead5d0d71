// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side session state for the OAuth round trip.
//!
//! Entries are partitioned by local user ID. The OAuth `state` nonce only
//! has to survive from `/login` to `/complete`; it is removed when read.
//! A user's entry is dropped once none of its fields is set.

use dashmap::DashMap;
use std::sync::Arc;

/// Per-user session data.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// OAuth `state` nonce issued by the last `/login`
    pub oauth_state: Option<String>,
    /// Where to send the user after `/complete`
    pub next_url: Option<String>,
    /// Last fetched Withings profile, for UI use
    pub profile: Option<serde_json::Value>,
}

impl SessionData {
    fn is_empty(&self) -> bool {
        self.oauth_state.is_none() && self.next_url.is_none() && self.profile.is_none()
    }
}

/// Shared in-memory session store.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<i64, SessionData>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's session.
    pub fn get(&self, user_id: i64) -> SessionData {
        self.inner
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Record a new authorization attempt. A missing `next_url` clears any
    /// stale value from an earlier attempt.
    pub fn start_authorization(&self, user_id: i64, oauth_state: String, next_url: Option<String>) {
        let mut entry = self.inner.entry(user_id).or_default();
        entry.oauth_state = Some(oauth_state);
        entry.next_url = next_url;
    }

    /// Remove and return the pending OAuth state nonce.
    pub fn take_oauth_state(&self, user_id: i64) -> Option<String> {
        let taken = self
            .inner
            .get_mut(&user_id)
            .and_then(|mut entry| entry.oauth_state.take());
        self.prune(user_id);
        taken
    }

    /// Remove and return the post-login redirect.
    pub fn take_next_url(&self, user_id: i64) -> Option<String> {
        let taken = self
            .inner
            .get_mut(&user_id)
            .and_then(|mut entry| entry.next_url.take());
        self.prune(user_id);
        taken
    }

    pub fn set_profile(&self, user_id: i64, profile: serde_json::Value) {
        self.inner.entry(user_id).or_default().profile = Some(profile);
    }

    pub fn clear_profile(&self, user_id: i64) {
        if let Some(mut entry) = self.inner.get_mut(&user_id) {
            entry.profile = None;
        }
        self.prune(user_id);
    }

    /// Number of users with live session data.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    // Callers must not hold a guard on `user_id`'s shard.
    fn prune(&self, user_id: i64) {
        self.inner.remove_if(&user_id, |_, session| session.is_empty());
    }
}
