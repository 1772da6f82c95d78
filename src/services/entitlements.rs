// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entitlement resolution.
//!
//! Combines custom auth claims, the staff/unlimited allowlists, the Stripe
//! subscription mirror and the entitlement document into access decisions.
//! Admin grants never clobber paid-plan provenance.

use crate::config::Allowlists;
use crate::db::{decode, paths, FirestoreDb, TxnPlan, TxnWrite};
use crate::error::{AppError, Result};
use crate::models::entitlement::{apply_admin_grant, AdminGrant};
use crate::models::{Entitlement, EntitlementSource, User};
use crate::services::firebase_auth::IdTokenClaims;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who is asking: UID plus email when the provider shares it.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub uid: &'a str,
    pub email: Option<&'a str>,
}

impl<'a> From<&'a IdTokenClaims> for Identity<'a> {
    fn from(claims: &'a IdTokenClaims) -> Self {
        Self {
            uid: &claims.sub,
            email: claims.email.as_deref(),
        }
    }
}

fn matches_allowlist(
    uids: &std::collections::HashSet<String>,
    emails: &std::collections::HashSet<String>,
    identity: Identity<'_>,
) -> bool {
    if uids.contains(identity.uid.trim()) {
        return true;
    }
    identity
        .email
        .map(|email| email.trim().to_lowercase())
        .is_some_and(|email| !email.is_empty() && emails.contains(&email))
}

/// Unlimited access from custom claims alone.
pub fn has_unlimited_access_from_claims(claims: &IdTokenClaims) -> bool {
    let flag = |v: Option<bool>| v.unwrap_or(false);
    flag(claims.unlimited_credits)
        || flag(claims.unlimited)
        || flag(claims.credits_unlimited)
        || flag(claims.admin)
        || flag(claims.staff)
        || claims.role.as_deref() == Some("admin")
}

/// Staff pro allowlist match (exact UID, case-insensitive email).
pub fn is_staff_pro(allowlists: &Allowlists, identity: Identity<'_>) -> bool {
    matches_allowlist(
        &allowlists.staff_pro_uids,
        &allowlists.staff_pro_emails,
        identity,
    )
}

/// Unlimited-credits allowlist match (exact UID, case-insensitive email).
pub fn is_unlimited_user(allowlists: &Allowlists, identity: Identity<'_>) -> bool {
    matches_allowlist(
        &allowlists.unlimited_uids,
        &allowlists.unlimited_emails,
        identity,
    )
}

/// Admin: admin claim, `role == "admin"`, or an allowlisted admin email.
pub fn is_admin(allowlists: &Allowlists, claims: &IdTokenClaims) -> bool {
    claims.admin.unwrap_or(false)
        || claims.role.as_deref() == Some("admin")
        || claims
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .is_some_and(|e| allowlists.admin_emails.contains(&e))
}

/// Unlimited credits from any source: claims or allowlist.
pub fn has_unlimited_credits(allowlists: &Allowlists, claims: &IdTokenClaims) -> bool {
    has_unlimited_access_from_claims(claims) || is_unlimited_user(allowlists, claims.into())
}

/// True iff the entitlement doc grants pro at `now`. Missing doc is false.
pub async fn has_pro_entitlement(db: &FirestoreDb, uid: &str, now: DateTime<Utc>) -> Result<bool> {
    Ok(db
        .get_entitlement(uid)
        .await?
        .is_some_and(|ent| ent.is_active_at(now.timestamp_millis())))
}

/// Outcome of an admin grant.
#[derive(Debug, Clone)]
pub struct AdminGrantOutcome {
    pub did_write: bool,
    pub entitlement: Entitlement,
}

/// Grant pro from an admin/staff source without touching paid provenance.
///
/// Idempotent: a second call is a no-op with `did_write == false`.
pub async fn ensure_admin_granted_pro_entitlement(
    db: &FirestoreDb,
    uid: &str,
    now: DateTime<Utc>,
) -> Result<AdminGrantOutcome> {
    let path = paths::entitlement(uid);
    let timestamp = format_utc_rfc3339(now);

    let write_path = path.clone();
    let outcome = db
        .transact(vec![path], move |docs| {
            let existing: Option<Entitlement> = decode(docs[0].as_ref())?;
            match apply_admin_grant(existing.as_ref(), &timestamp) {
                None => Ok(TxnPlan::read_only(AdminGrantOutcome {
                    did_write: false,
                    entitlement: existing.unwrap_or_default(),
                })),
                Some(AdminGrant {
                    entitlement,
                    fields,
                }) => {
                    let write = TxnWrite::merge(write_path.clone(), &entitlement, fields)?;
                    Ok(TxnPlan::new(
                        AdminGrantOutcome {
                            did_write: true,
                            entitlement,
                        },
                        vec![write],
                    ))
                }
            }
        })
        .await?;

    tracing::info!(
        uid,
        did_write = outcome.did_write,
        source = ?outcome.entitlement.source,
        "Admin pro entitlement ensured"
    );

    Ok(outcome)
}

/// Effective access for a signed-in user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
    pub pro: bool,
    pub source: Option<EntitlementSource>,
    pub expires_at: Option<i64>,
    pub unlimited: bool,
    pub staff: bool,
    pub admin: bool,
    pub subscription_active: bool,
}

/// Resolve access, applying the admin grant first for privileged users.
pub async fn sync_entitlements(
    db: &FirestoreDb,
    allowlists: &Allowlists,
    claims: &IdTokenClaims,
    now: DateTime<Utc>,
) -> Result<AccessSummary> {
    let uid = claims.sub.as_str();
    let staff = is_staff_pro(allowlists, claims.into()) || claims.staff.unwrap_or(false);
    let admin = is_admin(allowlists, claims);
    let unlimited = has_unlimited_credits(allowlists, claims);

    if staff || admin || is_unlimited_user(allowlists, claims.into()) {
        ensure_admin_granted_pro_entitlement(db, uid, now).await?;
    }

    let entitlement = db.get_entitlement(uid).await?.unwrap_or_default();
    let subscription_active = db
        .get_user(uid)
        .await?
        .is_some_and(|user| user.has_active_subscription());

    Ok(AccessSummary {
        pro: entitlement.is_active_at(now.timestamp_millis()) || subscription_active,
        source: entitlement.source,
        expires_at: entitlement.expires_at,
        unlimited,
        staff,
        admin,
        subscription_active,
    })
}

/// Give `target_uid` unlimited credits and an admin pro grant.
///
/// Caller must be an admin.
pub async fn grant_unlimited_credits(
    db: &FirestoreDb,
    allowlists: &Allowlists,
    caller: &IdTokenClaims,
    target_uid: &str,
    now: DateTime<Utc>,
) -> Result<AdminGrantOutcome> {
    if !is_admin(allowlists, caller) {
        tracing::warn!(caller = %caller.sub, target_uid, "Non-admin attempted unlimited grant");
        return Err(AppError::PermissionDenied("Admin only".to_string()));
    }

    let target = target_uid.trim();
    if target.is_empty() || target.contains('/') {
        return Err(AppError::InvalidArgument("uid is invalid".to_string()));
    }

    let user_path = paths::user(target);
    let timestamp = format_utc_rfc3339(now);
    let write_path = user_path.clone();
    db.transact(vec![user_path], move |docs| {
        let mut user: User = decode(docs[0].as_ref())?.unwrap_or_default();
        if user.unlimited_credits {
            return Ok(TxnPlan::read_only(()));
        }
        user.unlimited_credits = true;
        user.updated_at = Some(timestamp.clone());
        user.created_at.get_or_insert_with(|| timestamp.clone());
        let write = TxnWrite::merge(
            write_path.clone(),
            &user,
            &["unlimitedCredits", "createdAt", "updatedAt"],
        )?;
        Ok(TxnPlan::new((), vec![write]))
    })
    .await?;

    tracing::info!(caller = %caller.sub, target_uid = target, "Unlimited credits granted");
    ensure_admin_granted_pro_entitlement(db, target, now).await
}

/// Effective claim flags for `refreshClaims`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFlags {
    pub admin: bool,
    pub staff: bool,
    pub unlimited: bool,
    pub unlimited_credits: bool,
}

/// Access flags for the caller from claims, allowlists and the user mirror.
pub async fn refresh_claims(
    db: &FirestoreDb,
    allowlists: &Allowlists,
    claims: &IdTokenClaims,
) -> Result<ClaimFlags> {
    let mirror = db
        .get_user(&claims.sub)
        .await?
        .is_some_and(|user| user.unlimited_credits);
    let unlimited = has_unlimited_credits(allowlists, claims) || mirror;

    Ok(ClaimFlags {
        admin: is_admin(allowlists, claims),
        staff: claims.staff.unwrap_or(false) || is_staff_pro(allowlists, claims.into()),
        unlimited,
        unlimited_credits: unlimited,
    })
}

/// Result of `/system/bootstrap`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapResponse {
    pub created: bool,
    pub pro: bool,
}

/// Create the user document on first sign-in and apply allowlist grants.
pub async fn bootstrap_user(
    db: &FirestoreDb,
    allowlists: &Allowlists,
    claims: &IdTokenClaims,
    now: DateTime<Utc>,
) -> Result<BootstrapResponse> {
    let uid = claims.sub.clone();
    let user_path = paths::user(&uid);
    let timestamp = format_utc_rfc3339(now);
    let email = claims.email.clone();

    let write_path = user_path.clone();
    let created = db
        .transact(vec![user_path], move |docs| {
            if docs[0].is_some() {
                return Ok(TxnPlan::read_only(false));
            }
            let user = User {
                email: email.clone(),
                created_at: Some(timestamp.clone()),
                updated_at: Some(timestamp.clone()),
                ..Default::default()
            };
            Ok(TxnPlan::new(true, vec![TxnWrite::set(write_path.clone(), &user)?]))
        })
        .await?;

    if is_staff_pro(allowlists, claims.into()) || is_unlimited_user(allowlists, claims.into()) {
        ensure_admin_granted_pro_entitlement(db, &uid, now).await?;
    }

    let pro = has_pro_entitlement(db, &uid, now).await?;
    tracing::info!(uid = %uid, created, pro, "User bootstrapped");

    Ok(BootstrapResponse { created, pro })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> Allowlists {
        Allowlists::from_csv(Some("staff-uid"), Some("Coach@Gym.com"), None, None)
    }

    #[test]
    fn unlimited_user_matches_uid_without_email() {
        let lists = lists();
        assert!(is_unlimited_user(
            &lists,
            Identity {
                uid: "ww481RPvMYZzwn5vLX8FXyRlGVV2",
                email: None
            }
        ));
        assert!(is_unlimited_user(
            &lists,
            Identity {
                uid: "nope",
                email: Some("Tester@AdlrLabs.com")
            }
        ));
        assert!(!is_unlimited_user(
            &lists,
            Identity {
                uid: "nope",
                email: Some("nope@example.com")
            }
        ));
    }

    #[test]
    fn staff_pro_matches_either_identifier() {
        let lists = lists();
        assert!(is_staff_pro(
            &lists,
            Identity {
                uid: "staff-uid",
                email: None
            }
        ));
        assert!(is_staff_pro(
            &lists,
            Identity {
                uid: "x",
                email: Some(" coach@gym.COM ")
            }
        ));
        assert!(!is_staff_pro(
            &lists,
            Identity {
                uid: "STAFF-UID",
                email: Some("")
            }
        ));
    }

    #[test]
    fn claims_grant_unlimited() {
        assert!(!has_unlimited_access_from_claims(&IdTokenClaims::default()));

        for claims in [
            IdTokenClaims {
                unlimited_credits: Some(true),
                ..Default::default()
            },
            IdTokenClaims {
                credits_unlimited: Some(true),
                ..Default::default()
            },
            IdTokenClaims {
                staff: Some(true),
                ..Default::default()
            },
            IdTokenClaims {
                role: Some("admin".to_string()),
                ..Default::default()
            },
        ] {
            assert!(has_unlimited_access_from_claims(&claims));
        }

        let not_admin_role = IdTokenClaims {
            role: Some("coach".to_string()),
            unlimited: Some(false),
            ..Default::default()
        };
        assert!(!has_unlimited_access_from_claims(&not_admin_role));
    }

    #[test]
    fn admin_by_email_allowlist() {
        let lists = Allowlists::from_csv(None, None, None, Some("Boss@Example.com"));
        let claims = IdTokenClaims {
            sub: "u".to_string(),
            email: Some("boss@example.com".to_string()),
            ..Default::default()
        };
        assert!(is_admin(&lists, &claims));
        assert!(!is_admin(&lists, &IdTokenClaims::default()));
    }
}
