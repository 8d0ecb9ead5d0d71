// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod ingest;
pub mod integration;
pub mod oauth;
pub mod session;
pub mod sync;
pub mod withings;

pub use ingest::{ingest, IngestSummary};
pub use integration::{check_integration, is_integrated, GuardDecision};
pub use oauth::{CallbackParams, FlowOutcome};
pub use session::SessionStore;
pub use withings::{MeasurePayload, ProviderClient, WithingsClient};
