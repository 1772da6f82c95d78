// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Transactional rate limiting.
//!
//! - [`enforce_rate_limit`]: sliding event log per authenticated user.
//! - [`verify_rate_limit`]: fixed-window counter keyed by uid, IP or "anon".
//!
//! Each call is one transaction: read the bucket, decide, and write only if
//! the request is admitted.

use crate::db::{decode, paths, FirestoreDb, TxnPlan, TxnWrite};
use crate::error::{AppError, Result};
use crate::models::rate_limit::derive_rate_limit_key;
use crate::models::{Decision, FixedWindowBucket, UserRateLimits};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Error message returned to clients when a limit is hit.
pub const RATE_LIMITED: &str = "rate_limited";

/// A sliding-window limit for one logical key.
#[derive(Debug, Clone, Copy)]
pub struct SlidingLimit {
    pub key: &'static str,
    pub limit: u32,
    pub window: Duration,
}

pub const START_SCAN_LIMIT: SlidingLimit = SlidingLimit {
    key: "startScan",
    limit: 10,
    window: Duration::from_secs(60 * 60),
};

pub const RUN_SCAN_LIMIT: SlidingLimit = SlidingLimit {
    key: "runBodyScan",
    limit: 10,
    window: Duration::from_secs(60 * 60),
};

pub const USE_CREDIT_LIMIT: SlidingLimit = SlidingLimit {
    key: "useCredit",
    limit: 20,
    window: Duration::from_secs(60 * 60),
};

/// A fixed-window limit; `key` is the logical key before identity is added.
#[derive(Debug, Clone)]
pub struct FixedWindowLimit {
    pub key: String,
    pub max: u32,
    pub window: Duration,
}

/// Who a fixed-window request is attributed to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Caller<'a> {
    pub uid: Option<&'a str>,
    pub ip: Option<&'a str>,
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

fn denied(key: &str, retry_after_ms: i64) -> AppError {
    tracing::warn!(key, retry_after_ms, "Rate limit exceeded");
    AppError::ResourceExhausted(RATE_LIMITED.to_string())
}

/// Admit one event for `uid` under `limit`, or fail with `resource-exhausted`.
pub async fn enforce_rate_limit(
    db: &FirestoreDb,
    uid: &str,
    limit: SlidingLimit,
    now: DateTime<Utc>,
) -> Result<u32> {
    let path = paths::user_rate_limits(uid);
    let now_ms = now.timestamp_millis();
    let updated_at = format_utc_rfc3339(now);
    let window = window_ms(limit.window);

    let write_path = path.clone();
    let decision = db
        .transact(vec![path], move |docs| {
            let mut state: UserRateLimits = decode(docs[0].as_ref())?.unwrap_or_default();
            let decision = state
                .buckets
                .entry(limit.key.to_string())
                .or_default()
                .admit(now_ms, window, limit.limit);

            if !decision.is_allowed() {
                return Ok(TxnPlan::read_only(decision));
            }

            state.updated_at = Some(updated_at.clone());
            let write = TxnWrite::set(write_path.clone(), &state)?;
            Ok(TxnPlan::new(decision, vec![write]))
        })
        .await?;

    match decision {
        Decision::Allowed { remaining } => Ok(remaining),
        Decision::Denied { retry_after_ms } => Err(denied(limit.key, retry_after_ms)),
    }
}

/// Admit one request under a fixed-window limit keyed by caller identity.
pub async fn verify_rate_limit(
    db: &FirestoreDb,
    caller: Caller<'_>,
    limit: &FixedWindowLimit,
    now: DateTime<Utc>,
) -> Result<u32> {
    let key = derive_rate_limit_key(&limit.key, caller.uid, caller.ip);
    let path = paths::fixed_window_bucket(&key);
    let now_ms = now.timestamp_millis();
    let window = window_ms(limit.window);
    let max = limit.max;

    let write_path = path.clone();
    let decision = db
        .transact(vec![path], move |docs| {
            let existing: Option<FixedWindowBucket> = decode(docs[0].as_ref())?;
            let (decision, next) = FixedWindowBucket::admit(existing.as_ref(), now_ms, window, max);
            let writes = match next {
                Some(bucket) => vec![TxnWrite::set(write_path.clone(), &bucket)?],
                None => Vec::new(),
            };
            Ok(TxnPlan::new(decision, writes))
        })
        .await?;

    match decision {
        Decision::Allowed { remaining } => Ok(remaining),
        Decision::Denied { retry_after_ms } => Err(denied(&key, retry_after_ms)),
    }
}
