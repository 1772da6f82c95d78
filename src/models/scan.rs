// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan documents and their lifecycle.

use crate::models::CreditSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Photo pose accepted for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPose {
    Front,
    Back,
    Left,
    Right,
}

impl ScanPose {
    pub const ALL: [ScanPose; 4] = [
        ScanPose::Front,
        ScanPose::Back,
        ScanPose::Left,
        ScanPose::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPose::Front => "front",
            ScanPose::Back => "back",
            ScanPose::Left => "left",
            ScanPose::Right => "right",
        }
    }
}

impl fmt::Display for ScanPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan lifecycle: `queued → processing → succeeded | completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ScanStatus {
    Queued,
    Processing,
    Succeeded,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Succeeded | ScanStatus::Completed | ScanStatus::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanStatus::Succeeded | ScanStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// Measurements and photo poses submitted with a scan.
///
/// Lengths are inches, weight is pounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanInput {
    #[serde(default)]
    #[validate(length(max = 4))]
    pub poses: Vec<String>,
    #[serde(default)]
    #[validate(range(min = 20.0, max = 110.0))]
    pub height_in: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 40.0, max = 1000.0))]
    pub weight_lb: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 10.0, max = 100.0))]
    pub waist_in: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 5.0, max = 40.0))]
    pub neck_in: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 10.0, max = 100.0))]
    pub hip_in: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 13, max = 120))]
    pub age: Option<u32>,
    #[serde(default)]
    pub sex: Option<Sex>,
}

/// How body fat was estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFatMethod {
    Navy,
    Deurenberg,
}

/// Analysis output written to a completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetrics {
    pub bmi: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub method: Option<BodyFatMethod>,
    /// Name of the provider that produced these numbers
    pub provider: String,
    /// True when the numbers come from the placeholder estimator
    #[serde(default)]
    pub placeholder: bool,
}

/// Storage location of one uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPhoto {
    pub pose: ScanPose,
    pub path: String,
}

/// Scan stored at `users/{uid}/scans/{scanId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub scan_id: String,
    pub uid: String,
    pub status: ScanStatus,
    pub input: ScanInput,
    #[serde(default)]
    pub photos: Vec<ScanPhoto>,
    pub credit_source: CreditSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScanMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ScanStatus::Queued.is_terminal());
        assert!(!ScanStatus::Processing.is_terminal());
        assert!(ScanStatus::Completed.is_success());
        assert!(ScanStatus::Succeeded.is_success());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Failed.is_success());
    }

    #[test]
    fn input_range_validation() {
        let ok = ScanInput {
            height_in: Some(70.0),
            weight_lb: Some(180.0),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = ScanInput {
            height_in: Some(7.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ScanStatus::Processing).unwrap(),
            "processing"
        );
    }
}
