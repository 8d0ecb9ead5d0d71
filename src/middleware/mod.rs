// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, integration warnings).

pub mod auth;
pub mod integration;

pub use auth::require_auth;
pub use integration::warn_if_not_integrated;
