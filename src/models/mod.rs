// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod credential;
pub mod measure;

pub use credential::Credential;
pub use measure::{scaled_value, Attribution, Category, Measure, MeasureGroup, MeasureType};
