// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate-limit bucket documents and admission rules.
//!
//! Two models are kept:
//! - a sliding event log per user (`users/{uid}/private/rateLimits`)
//! - a fixed-window counter per derived key (`ratelimits/{key}`)
//!
//! Both are pure here; the store wraps them in a transaction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted; `remaining` requests are left in the window.
    Allowed { remaining: u32 },
    /// Request rejected; the window frees up after `retry_after_ms`.
    Denied { retry_after_ms: i64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Event timestamps (epoch ms) for one logical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlidingBucket {
    #[serde(default)]
    pub events: Vec<i64>,
}

impl SlidingBucket {
    /// Drop events outside `[now - window, now]`, then admit if fewer than
    /// `limit` remain. Admission appends `now`.
    pub fn admit(&mut self, now_ms: i64, window_ms: i64, limit: u32) -> Decision {
        let window_start = now_ms - window_ms;
        self.events.retain(|&t| t >= window_start && t <= now_ms);

        if self.events.len() >= limit as usize {
            let oldest = self.events.iter().copied().min().unwrap_or(now_ms);
            return Decision::Denied {
                retry_after_ms: (oldest + window_ms - now_ms).max(0),
            };
        }

        self.events.push(now_ms);
        Decision::Allowed {
            remaining: limit.saturating_sub(self.events.len() as u32),
        }
    }
}

/// All sliding buckets of one user, keyed by logical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRateLimits {
    #[serde(default)]
    pub buckets: HashMap<String, SlidingBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Fixed-window counter stored at `ratelimits/{key}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedWindowBucket {
    #[serde(default)]
    pub count: u32,
    /// Window start in epoch ms
    #[serde(default)]
    pub window_start: i64,
}

impl FixedWindowBucket {
    /// Admit one request.
    ///
    /// Returns the decision and, when admitted, the bucket to persist. A
    /// rejected request leaves the stored bucket unchanged.
    pub fn admit(
        existing: Option<&FixedWindowBucket>,
        now_ms: i64,
        window_ms: i64,
        max: u32,
    ) -> (Decision, Option<FixedWindowBucket>) {
        let next = match existing {
            Some(bucket) if now_ms - bucket.window_start <= window_ms => FixedWindowBucket {
                count: bucket.count.saturating_add(1),
                window_start: bucket.window_start,
            },
            _ => FixedWindowBucket {
                count: 1,
                window_start: now_ms,
            },
        };

        if next.count > max {
            let retry_after_ms = (next.window_start + window_ms - now_ms).max(0);
            return (Decision::Denied { retry_after_ms }, None);
        }

        let remaining = max - next.count;
        (Decision::Allowed { remaining }, Some(next))
    }
}

/// Derive the fixed-window key `{key}:{uid|ip|anon}`.
pub fn derive_rate_limit_key(key: &str, uid: Option<&str>, ip: Option<&str>) -> String {
    let identity = uid
        .filter(|s| !s.trim().is_empty())
        .or(ip.filter(|s| !s.trim().is_empty()))
        .unwrap_or("anon");
    format!("{}:{}", key, identity.trim())
}
