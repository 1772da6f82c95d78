// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily pre-scan quality gate counter.

use crate::db::{decode, paths, FirestoreDb, TxnPlan, TxnWrite};
use crate::error::Result;
use crate::models::GateCounter;
use crate::time_utils::{format_utc_rfc3339, utc_date_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateResultRequest {
    /// Defaults to a failed attempt
    #[serde(default)]
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateResultResponse {
    pub failed: u32,
    pub passed: u32,
    pub remaining: u32,
}

/// Count one gate attempt for today (UTC). Advisory only.
pub async fn record_gate_result(
    db: &FirestoreDb,
    uid: &str,
    passed: bool,
    now: DateTime<Utc>,
) -> Result<GateResultResponse> {
    let path = paths::gate(uid, &utc_date_key(now));
    let timestamp = format_utc_rfc3339(now);

    let write_path = path.clone();
    let counter = db
        .transact(vec![path], move |docs| {
            let mut counter: GateCounter = decode(docs[0].as_ref())?.unwrap_or_default();
            if passed {
                counter.passed += 1;
            } else {
                counter.failed += 1;
            }
            counter.updated_at = Some(timestamp.clone());
            let write = TxnWrite::set(write_path.clone(), &counter)?;
            Ok(TxnPlan::new(counter, vec![write]))
        })
        .await?;

    tracing::info!(uid, passed, failed = counter.failed, "Gate attempt recorded");

    Ok(GateResultResponse {
        failed: counter.failed,
        passed: counter.passed,
        remaining: counter.remaining(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn counters_reset_per_utc_day() {
        let db = FirestoreDb::new_in_memory();
        let day1 = Utc.with_ymd_and_hms(2026, 5, 1, 23, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 5, 2, 0, 30, 0).unwrap();

        for _ in 0..4 {
            record_gate_result(&db, "u1", false, day1).await.unwrap();
        }
        let last = record_gate_result(&db, "u1", true, day1).await.unwrap();
        assert_eq!((last.failed, last.passed, last.remaining), (4, 1, 0));

        let next_day = record_gate_result(&db, "u1", false, day2).await.unwrap();
        assert_eq!((next_day.failed, next_day.remaining), (1, 2));
    }
}
