//! User model and credit balance.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Which balance paid for a scan or credit use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum CreditSource {
    Bundle,
    Credit,
}

/// Prepaid scan bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default)]
    pub remaining: i64,
}

/// Billing subscription status mirrored from Stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Paid,
    Unlimited,
    Lifetime,
    Inactive,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Statuses that grant paid access.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::Trialing
                | SubscriptionStatus::Paid
                | SubscriptionStatus::Unlimited
                | SubscriptionStatus::Lifetime
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub status: SubscriptionStatus,
}

/// User root document stored at `users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Plain credits (never negative after a write from this service)
    #[serde(default)]
    pub credits: i64,
    /// Prepaid bundle, consumed before plain credits
    #[serde(default)]
    pub bundle: Bundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Mirror of the unlimited-credits custom claim
    #[serde(default)]
    pub unlimited_credits: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    /// Combined bundle + plain credit balance.
    pub fn total_credits(&self) -> i64 {
        self.bundle.remaining.max(0) + self.credits.max(0)
    }

    /// Take one credit, bundle first.
    ///
    /// Returns `None` and leaves the balance untouched when nothing is left.
    pub fn consume_credit(&mut self) -> Option<CreditSource> {
        if self.bundle.remaining > 0 {
            self.bundle.remaining -= 1;
            Some(CreditSource::Bundle)
        } else if self.credits > 0 {
            self.credits -= 1;
            Some(CreditSource::Credit)
        } else {
            None
        }
    }

    pub fn has_active_subscription(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|s| s.status.grants_access())
    }
}

/// Audit record of which balance paid for a scan or credit use.
///
/// Stored at `users/{uid}/credit_uses/{scanId | uuid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditUse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub reason: String,
    pub source: CreditSource,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_is_preferred_over_credits() {
        let mut user = User {
            credits: 2,
            bundle: Bundle { remaining: 1 },
            ..Default::default()
        };

        assert_eq!(user.consume_credit(), Some(CreditSource::Bundle));
        assert_eq!(user.consume_credit(), Some(CreditSource::Credit));
        assert_eq!(user.consume_credit(), Some(CreditSource::Credit));
        assert_eq!(user.consume_credit(), None);
        assert_eq!(user.total_credits(), 0);
        assert_eq!(user.credits, 0);
        assert_eq!(user.bundle.remaining, 0);
    }

    #[test]
    fn negative_balances_are_not_spendable() {
        let mut user = User {
            credits: -3,
            bundle: Bundle { remaining: -1 },
            ..Default::default()
        };
        assert_eq!(user.total_credits(), 0);
        assert_eq!(user.consume_credit(), None);
        assert_eq!(user.credits, -3);
    }

    #[test]
    fn deserializes_sparse_document() {
        let user: User = serde_json::from_value(serde_json::json!({
            "credits": 4,
            "subscription": { "status": "trialing" },
            "someLegacyField": true
        }))
        .unwrap();

        assert_eq!(user.credits, 4);
        assert_eq!(user.bundle.remaining, 0);
        assert!(user.has_active_subscription());
    }

    #[test]
    fn unknown_subscription_status_denies_access() {
        let user: User = serde_json::from_value(serde_json::json!({
            "subscription": { "status": "past_due" }
        }))
        .unwrap();
        assert!(!user.has_active_subscription());
    }
}
