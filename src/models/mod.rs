// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod app_config;
pub mod entitlement;
pub mod gate;
pub mod rate_limit;
pub mod scan;
pub mod user;

pub use app_config::AppConfig;
pub use entitlement::{Entitlement, EntitlementSource};
pub use gate::GateCounter;
pub use rate_limit::{Decision, FixedWindowBucket, SlidingBucket, UserRateLimits};
pub use scan::{BodyFatMethod, Scan, ScanInput, ScanMetrics, ScanPhoto, ScanPose, ScanStatus, Sex};
pub use user::{CreditSource, CreditUse, User};
