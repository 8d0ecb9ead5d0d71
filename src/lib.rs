// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings-Link: connect local user accounts to Withings health data
//!
//! This crate links users to their Withings accounts via OAuth2, imports
//! their body measurements into a local store and keeps that store current
//! from Withings notification callbacks.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Database;
use services::{ProviderClient, SessionStore};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub provider: Arc<dyn ProviderClient>,
    pub sessions: SessionStore,
}
