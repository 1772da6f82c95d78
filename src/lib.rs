// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! MyBodyScan: credit-metered body composition scans.
//!
//! This crate provides the backend API: credit ledger, scan runner,
//! entitlement resolution and Firestore-backed rate limiting.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;
pub mod storage_paths;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use providers::ScanProviders;
use services::FirebaseTokenVerifier;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub id_tokens: Arc<FirebaseTokenVerifier>,
    pub app_check: Arc<FirebaseTokenVerifier>,
    pub providers: ScanProviders,
}
