//! Ingestion of provider-pushed billing events.
//!
//! The signature check is the only authentication on this path and fails
//! closed. Only `invoice.upcoming` is handled; other types are rejected with
//! a server error so the provider retries the delivery. Deliveries are not
//! deduplicated, so an at-least-once provider may trigger the notice twice.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{error, info, warn};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::billing::provider::BillingProvider;
use crate::billing::services::notify::RenewalNotice;
use crate::common::error::{AppError, Res};
use crate::mailer::EmailTransport;

/// Placeholder customer id carried by simulated/test deliveries; resolution
/// short-circuits to the payload's own email.
pub const SIMULATED_CUSTOMER: &str = "cus_00000000000000";

/// Accepted clock drift between the signature timestamp and now.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct BillingEvent {
    #[serde(rename = "type")]
    kind: String,
    data: BillingEventData,
}

#[derive(Debug, Deserialize)]
struct BillingEventData {
    object: BillingEventObject,
}

#[derive(Debug, Deserialize)]
struct BillingEventObject {
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

pub struct EventIngestion {
    provider: Arc<dyn BillingProvider>,
    mailer: Arc<dyn EmailTransport>,
    notice: RenewalNotice,
    webhook_secret: String,
}

impl EventIngestion {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        mailer: Arc<dyn EmailTransport>,
        notice: RenewalNotice,
        webhook_secret: String,
    ) -> Self {
        EventIngestion {
            provider,
            mailer,
            notice,
            webhook_secret,
        }
    }

    /// Verifies, filters and dispatches one delivery. Email transport
    /// failures are logged and swallowed; the provider sees success once
    /// dispatch was attempted.
    pub async fn handle(&self, payload: &str, signature: &str) -> Res<()> {
        verify_signature(payload, signature, &self.webhook_secret)?;

        let event: BillingEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::BadRequest(format!("Malformed event payload: {}", e)))?;

        if event.kind != "invoice.upcoming" {
            error!("Unsupported event type {}", event.kind);
            return Err(AppError::Internal(format!(
                "Unsupported event type: {}",
                event.kind
            )));
        }

        let (google_email, customer_email) = self.resolve_emails(&event.data.object).await?;

        // union of both addresses, deliberately without dedup
        let mut recipients = Vec::new();
        if let Some(email) = &google_email {
            recipients.push(email.clone());
        }
        if let Some(email) = &customer_email {
            recipients.push(email.clone());
        }

        let body = self
            .notice
            .render(&recipients, google_email.as_deref().unwrap_or_default());

        info!("Sending renewal notification email to {:?}", recipients);
        if let Err(err) = self.mailer.send(&recipients, body.as_bytes()).await {
            error!("Failed to send renewal notice: {}", err);
        }

        Ok(())
    }

    /// Recovers the identity-provider email and the billing email for the
    /// event's customer. The sentinel id uses the payload email for both
    /// without touching the provider.
    async fn resolve_emails(
        &self,
        object: &BillingEventObject,
    ) -> Res<(Option<String>, Option<String>)> {
        let customer_id = object.customer.as_deref().unwrap_or_default();

        if customer_id == SIMULATED_CUSTOMER {
            return Ok((object.customer_email.clone(), object.customer_email.clone()));
        }

        let customer = match self.provider.retrieve_customer(customer_id).await {
            Ok(customer) => customer,
            Err(err) => {
                error!("Unable to get customer {}: {}", customer_id, err);
                return Err(err);
            }
        };

        Ok((customer.google_email, customer.email))
    }
}

/// Validates a `Stripe-Signature` style header (`t=...,v1=...`) against the
/// shared secret: HMAC-SHA256 over `"{t}.{payload}"`, constant-time
/// comparison, timestamp bounded to the tolerance window.
pub fn verify_signature(payload: &str, header: &str, secret: &str) -> Res<()> {
    verify_signature_at(payload, header, secret, Utc::now().timestamp())
}

fn verify_signature_at(payload: &str, header: &str, secret: &str, now: i64) -> Res<()> {
    let invalid = || AppError::BadRequest("Invalid signature".to_string());

    let mut timestamp: Option<i64> = None;
    let mut candidate: Option<&str> = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidate = Some(value),
            _ => {}
        }
    }

    let (Some(timestamp), Some(candidate)) = (timestamp, candidate) else {
        warn!("Malformed webhook signature header");
        return Err(invalid());
    };

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        warn!("Webhook signature timestamp outside tolerance");
        return Err(invalid());
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| invalid())?;
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let expected = hex_encode(&mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())) {
        warn!("Webhook signature mismatch");
        return Err(invalid());
    }

    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
