// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pro entitlement document and admin-grant merge rules.

use crate::time_utils::deserialize_optional_epoch_ms;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where a pro entitlement came from.
///
/// Unknown sources round-trip unchanged through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum EntitlementSource {
    Admin,
    AdminAllowlist,
    Iap,
    Stripe,
    #[serde(untagged)]
    Other(String),
}

impl EntitlementSource {
    /// Paid-plan provenance that admin grants must not overwrite.
    pub fn is_paid(&self) -> bool {
        matches!(self, EntitlementSource::Iap | EntitlementSource::Stripe)
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            EntitlementSource::Admin | EntitlementSource::AdminAllowlist
        )
    }
}

/// Entitlement stored at `users/{uid}/entitlements/current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    #[serde(default)]
    pub pro: bool,
    #[serde(default)]
    pub source: Option<EntitlementSource>,
    /// Expiry in epoch milliseconds; `None` never expires.
    ///
    /// Billing writers store a Firestore timestamp here, so both forms are
    /// read.
    #[serde(default, deserialize_with = "deserialize_optional_epoch_ms")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entitlement {
    /// True iff `pro` is set and the entitlement has not expired at `now_ms`.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.pro && self.expires_at.is_none_or(|expires| expires > now_ms)
    }

    /// True if this is already a non-expiring admin grant.
    pub fn is_current_admin_grant(&self) -> bool {
        self.pro && self.source.as_ref().is_some_and(|s| s.is_admin()) && self.expires_at.is_none()
    }
}

/// Fields written when a paid entitlement is switched on.
pub const PAID_GRANT_FIELDS: &[&str] = &["pro", "updatedAt"];

/// Fields written by a full admin grant.
pub const ADMIN_GRANT_FIELDS: &[&str] = &["pro", "source", "expiresAt", "grantedAt", "updatedAt"];

/// An admin grant to merge into the entitlement document.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminGrant {
    /// The entitlement after the grant
    pub entitlement: Entitlement,
    /// The only fields the write may touch
    pub fields: &'static [&'static str],
}

/// Compute the merge an admin/staff grant should write.
///
/// Returns `None` when the existing entitlement is already correct. Paid
/// entitlements only get `pro` flipped on; their source, expiry, grant time
/// and any billing metadata are left exactly as they were.
pub fn apply_admin_grant(existing: Option<&Entitlement>, now: &str) -> Option<AdminGrant> {
    match existing {
        Some(current) if current.is_current_admin_grant() => None,
        Some(current) if current.source.as_ref().is_some_and(|s| s.is_paid()) => {
            if current.pro {
                return None;
            }
            Some(AdminGrant {
                entitlement: Entitlement {
                    pro: true,
                    updated_at: Some(now.to_string()),
                    ..current.clone()
                },
                fields: PAID_GRANT_FIELDS,
            })
        }
        _ => Some(AdminGrant {
            entitlement: Entitlement {
                pro: true,
                source: Some(EntitlementSource::Admin),
                expires_at: None,
                granted_at: existing
                    .and_then(|e| e.granted_at.clone())
                    .or_else(|| Some(now.to_string())),
                updated_at: Some(now.to_string()),
            },
            fields: ADMIN_GRANT_FIELDS,
        }),
    }
}
