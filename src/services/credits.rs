// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credit ledger: starting scans and consuming credits.
//!
//! A credit is never consumed without its audit record (and, for scans, the
//! scan document): all of them are written in the same transaction.

use crate::db::{decode, paths, FirestoreDb, TxnPlan, TxnWrite};
use crate::error::{AppError, Result};
use crate::models::{CreditSource, CreditUse, Scan, ScanInput, ScanPhoto, ScanStatus, User};
use crate::storage_paths::{assert_scan_pose, build_scan_photo_path};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// `startScan` payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartScanRequest {
    #[validate(length(min = 1, max = 128))]
    pub scan_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub input: ScanInput,
}

/// `startScan` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartScanResponse {
    pub scan_id: String,
    /// Bundle + plain credits left after this scan
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub remaining: i64,
    pub source: CreditSource,
}

/// `useCredit` payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UseCreditRequest {
    #[serde(default)]
    #[validate(length(max = 200))]
    pub reason: Option<String>,
}

/// `useCredit` result. `remaining` is `None` for unlimited users.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditResponse {
    pub ok: bool,
    pub remaining: Option<i64>,
    pub unlimited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CreditSource>,
}

impl UseCreditResponse {
    /// Response for callers who are never charged.
    pub fn unlimited() -> Self {
        Self {
            ok: true,
            remaining: None,
            unlimited: true,
            source: None,
        }
    }
}

/// User fields a credit charge touches. Webhook-owned fields are left alone.
const BALANCE_FIELDS: &[&str] = &["credits", "bundle.remaining", "updatedAt"];

/// Validate poses and build their Storage paths.
fn scan_photos(uid: &str, scan_id: &str, poses: &[String]) -> Result<Vec<ScanPhoto>> {
    let mut seen = HashSet::new();
    poses
        .iter()
        .map(|raw| {
            let pose = assert_scan_pose(raw)?;
            if !seen.insert(pose) {
                return Err(AppError::InvalidArgument(format!("Duplicate pose: {pose}")));
            }
            Ok(ScanPhoto {
                pose,
                path: build_scan_photo_path(uid, scan_id, pose.as_str())?,
            })
        })
        .collect()
}

/// Consume one credit and create a queued scan, atomically.
///
/// Bundle credits are spent before plain credits. Fails with
/// `failed-precondition` when the user has none left or the scan already
/// exists.
pub async fn start_scan(
    db: &FirestoreDb,
    uid: &str,
    request: StartScanRequest,
    now: DateTime<Utc>,
) -> Result<StartScanResponse> {
    request.validate()?;
    let scan_id = request.scan_id.trim().to_string();
    if scan_id.is_empty() || scan_id.contains('/') {
        return Err(AppError::InvalidArgument("scanId is invalid".to_string()));
    }
    let photos = scan_photos(uid, &scan_id, &request.input.poses)?;

    let timestamp = format_utc_rfc3339(now);
    let user_path = paths::user(uid);
    let scan_path = paths::scan(uid, &scan_id);
    let use_path = paths::credit_use(uid, &scan_id);

    let template = Scan {
        scan_id: scan_id.clone(),
        uid: uid.to_string(),
        status: ScanStatus::Queued,
        input: request.input,
        photos,
        credit_source: CreditSource::Credit,
        metrics: None,
        provider: None,
        logs: Vec::new(),
        created_at: timestamp.clone(),
        updated_at: timestamp.clone(),
        completed_at: None,
    };

    let reads = vec![user_path.clone(), scan_path.clone()];
    let response = db
        .transact(reads, move |docs| {
            if docs[1].is_some() {
                return Err(AppError::FailedPrecondition(
                    "Scan already exists".to_string(),
                ));
            }

            let mut user: User = decode(docs[0].as_ref())?.unwrap_or_default();
            let source = user
                .consume_credit()
                .ok_or_else(|| AppError::FailedPrecondition(AppError::NO_CREDITS.to_string()))?;
            user.updated_at = Some(timestamp.clone());

            let scan = Scan {
                credit_source: source,
                ..template.clone()
            };
            let credit_use = CreditUse {
                scan_id: Some(template.scan_id.clone()),
                reason: "scan".to_string(),
                source,
                created_at: timestamp.clone(),
            };

            let writes = vec![
                TxnWrite::merge(user_path.clone(), &user, BALANCE_FIELDS)?,
                TxnWrite::set(scan_path.clone(), &scan)?,
                TxnWrite::set(use_path.clone(), &credit_use)?,
            ];

            Ok(TxnPlan::new(
                StartScanResponse {
                    scan_id: template.scan_id.clone(),
                    remaining: user.total_credits(),
                    source,
                },
                writes,
            ))
        })
        .await?;

    tracing::info!(
        uid,
        scan_id = %response.scan_id,
        source = ?response.source,
        remaining = response.remaining,
        "Scan started"
    );

    Ok(response)
}

/// Consume one credit outside the scan flow, recording a credit use.
///
/// Users with the `unlimitedCredits` mirror flag are not charged.
pub async fn use_credit(
    db: &FirestoreDb,
    uid: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<UseCreditResponse> {
    let timestamp = format_utc_rfc3339(now);
    let use_id = uuid::Uuid::new_v4().to_string();
    let user_path = paths::user(uid);
    let use_path = paths::credit_use(uid, &use_id);
    let reason = reason.to_string();

    let response = db
        .transact(vec![user_path.clone()], move |docs| {
            let mut user: User = decode(docs[0].as_ref())?.unwrap_or_default();
            if user.unlimited_credits {
                return Ok(TxnPlan::read_only(UseCreditResponse::unlimited()));
            }
            let source = user
                .consume_credit()
                .ok_or_else(|| AppError::FailedPrecondition(AppError::NO_CREDITS.to_string()))?;
            user.updated_at = Some(timestamp.clone());

            let credit_use = CreditUse {
                scan_id: None,
                reason: reason.clone(),
                source,
                created_at: timestamp.clone(),
            };

            Ok(TxnPlan::new(
                UseCreditResponse {
                    ok: true,
                    remaining: Some(user.total_credits()),
                    unlimited: false,
                    source: Some(source),
                },
                vec![
                    TxnWrite::merge(user_path.clone(), &user, BALANCE_FIELDS)?,
                    TxnWrite::set(use_path.clone(), &credit_use)?,
                ],
            ))
        })
        .await?;

    tracing::info!(uid, remaining = ?response.remaining, "Credit used");
    Ok(response)
}
