// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credits;
pub mod entitlements;
pub mod firebase_auth;
pub mod gate;
pub mod rate_limit;
pub mod scans;

pub use firebase_auth::{AppCheckClaims, FirebaseTokenVerifier, IdTokenClaims, TokenError};
pub use rate_limit::{enforce_rate_limit, verify_rate_limit, Caller, FixedWindowLimit, SlidingLimit};
