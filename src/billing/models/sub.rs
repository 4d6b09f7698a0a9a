use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Client-visible subscription state, derived from the provider object.
///
/// `cancel_at_period_end` being set moves an otherwise-active subscription
/// into `PendingCancel`; `Canceled` is terminal but the record is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PendingCancel,
    Canceled,
}

/// Snapshot of a provider subscription, keyed by the owning user.
///
/// `current_period_end` is the next renewal instant while active and the
/// final-access instant while pending cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub user_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
}

impl SubscriptionRecord {
    /// Formats `current_period_end` as an RFC 3339 UTC instant for
    /// user-facing messages.
    pub fn period_end_rfc3339(&self) -> String {
        DateTime::from_timestamp(self.current_period_end, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| self.current_period_end.to_string())
    }
}

/// Projection of the provider's customer object; `google_email` comes from
/// the `google_email` metadata entry written at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingCustomer {
    pub id: String,
    pub email: Option<String>,
    pub google_email: Option<String>,
}
