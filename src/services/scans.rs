// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan runner: drives a queued scan through the selected provider.
//!
//! The credit was already spent in `start_scan`, so status updates here are
//! plain writes of the touched fields only. Providers are not retried.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{ScanMetrics, ScanStatus};
use crate::providers::{ProviderError, ScanProviders};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RunScanRequest {
    #[validate(length(min = 1, max = 128))]
    pub scan_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScanResponse {
    pub scan_id: String,
    pub status: ScanStatus,
    pub metrics: Option<ScanMetrics>,
    pub provider: Option<String>,
}

/// Run (or re-report) the analysis for one scan.
pub async fn run_body_scan(
    db: &FirestoreDb,
    providers: &ScanProviders,
    uid: &str,
    scan_id: &str,
    now: DateTime<Utc>,
) -> Result<RunScanResponse> {
    let scan_id = scan_id.trim();
    let mut scan = db
        .get_scan(uid, scan_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Scan {scan_id} not found")))?;

    if scan.status.is_success() {
        tracing::debug!(uid, scan_id, status = ?scan.status, "Scan already complete");
        return Ok(RunScanResponse {
            scan_id: scan.scan_id,
            status: scan.status,
            metrics: scan.metrics,
            provider: scan.provider,
        });
    }

    let provider = providers.select(db).await;
    let timestamp = format_utc_rfc3339(now);

    scan.status = ScanStatus::Processing;
    scan.provider = Some(provider.name().to_string());
    scan.updated_at = timestamp.clone();
    db.update_scan(&scan, &["status", "provider", "updatedAt"])
        .await?;

    tracing::info!(uid, scan_id, provider = provider.name(), "Scan processing");

    match provider.analyze(&scan.input).await {
        Ok(metrics) => {
            scan.status = ScanStatus::Completed;
            scan.metrics = Some(metrics);
            scan.completed_at = Some(timestamp.clone());
            scan.updated_at = timestamp;
            db.update_scan(&scan, &["status", "metrics", "completedAt", "updatedAt"])
                .await?;

            tracing::info!(uid, scan_id, provider = provider.name(), "Scan completed");

            Ok(RunScanResponse {
                scan_id: scan.scan_id,
                status: scan.status,
                metrics: scan.metrics,
                provider: scan.provider,
            })
        }
        Err(e) => {
            tracing::error!(uid, scan_id, provider = provider.name(), error = %e, "Scan failed");

            scan.status = ScanStatus::Failed;
            scan.logs = vec![e.to_string()];
            scan.updated_at = timestamp;
            db.update_scan(&scan, &["status", "logs", "updatedAt"])
                .await?;

            Err(match e {
                ProviderError::NotConfigured(_) => {
                    AppError::Unavailable("Scan provider is not configured".to_string())
                }
                ProviderError::Failed(_) => {
                    AppError::Internal(anyhow::anyhow!("scan {scan_id} failed: {e}"))
                }
            })
        }
    }
}
