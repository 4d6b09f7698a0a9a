use serde::{Deserialize, Serialize};

use crate::billing::models::sub::SubscriptionRecord;

/// One-shot checkout form posted by the payment page. Field names follow
/// what the checkout widget submits.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeForm {
    pub user_id: String,
    /// Identity-provider account email the subscription is registered under.
    pub user_email: String,
    pub success_url: String,
    pub failure_url: String,
    #[serde(rename = "stripeToken")]
    pub payment_token: String,
    /// Billing email collected at checkout; falls back to `user_email`.
    #[serde(rename = "stripeEmail", default)]
    pub billing_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: SubscriptionRecord,
}
