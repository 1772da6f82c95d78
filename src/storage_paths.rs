// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Storage object paths for scan photos.
//!
//! All scan photo paths are built here: `scans/{uid}/{scanId}/{pose}.jpg`.

use crate::error::AppError;
use crate::models::ScanPose;

/// Parse a pose name, rejecting anything but front/back/left/right.
pub fn assert_scan_pose(raw: &str) -> Result<ScanPose, AppError> {
    let normalized = raw.trim().to_ascii_lowercase();
    ScanPose::ALL
        .into_iter()
        .find(|pose| pose.as_str() == normalized)
        .ok_or_else(|| AppError::InvalidArgument(format!("Invalid scan pose: {raw:?}")))
}

/// Build the Storage path for one scan photo.
pub fn build_scan_photo_path(uid: &str, scan_id: &str, pose: &str) -> Result<String, AppError> {
    let uid = path_component("uid", uid)?;
    let scan_id = path_component("scanId", scan_id)?;
    let pose = assert_scan_pose(pose)?;
    Ok(format!("scans/{uid}/{scan_id}/{pose}.jpg"))
}

fn path_component<'a>(name: &str, raw: &'a str) -> Result<&'a str, AppError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::InvalidArgument(format!("{name} is required")));
    }
    if value.contains('/') || value == "." || value == ".." {
        return Err(AppError::InvalidArgument(format!(
            "{name} must not contain path separators"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_trimmed_path() {
        assert_eq!(
            build_scan_photo_path(" user1 ", "scan123", "front").unwrap(),
            "scans/user1/scan123/front.jpg"
        );
    }

    #[test]
    fn pose_is_case_insensitive_but_strict() {
        assert_eq!(assert_scan_pose("Back").unwrap(), ScanPose::Back);
        assert!(matches!(
            assert_scan_pose("upper"),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(assert_scan_pose("").is_err());
    }

    #[test]
    fn rejects_empty_or_nested_components() {
        assert!(build_scan_photo_path("  ", "scan", "left").is_err());
        assert!(build_scan_photo_path("u1", "a/b", "left").is_err());
        assert!(build_scan_photo_path("u1", "..", "left").is_err());
        assert!(build_scan_photo_path("u1", "s1", "top").is_err());
    }
}
