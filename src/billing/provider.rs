use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CreateCustomer, CreateSubscription, CreateSubscriptionItems, Customer, CustomerId,
    Expandable, PaymentSourceParams, Subscription, SubscriptionId, UpdateSubscription,
};

use crate::billing::models::sub::{BillingCustomer, SubscriptionRecord, SubscriptionStatus};
use crate::common::error::{AppError, Res};

/// Input for creating a billing customer during an upgrade.
#[derive(Debug, Clone)]
pub struct CreateCustomerParams {
    pub email: String,
    pub description: String,
    /// One-shot payment-method token collected by the checkout form.
    pub source_token: String,
    /// Identity-provider email, stored in customer metadata for later
    /// correlation.
    pub google_email: String,
}

/// Input for creating the subscription itself.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionParams {
    pub customer_id: String,
    pub price_id: String,
    /// Application user id, stored in subscription metadata.
    pub user_id: String,
}

/// Remote billing API surface used by the lifecycle and webhook paths.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_customer(&self, params: CreateCustomerParams) -> Res<BillingCustomer>;

    async fn retrieve_customer(&self, customer_id: &str) -> Res<BillingCustomer>;

    async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
    ) -> Res<SubscriptionRecord>;

    /// Flips the provider-side `cancel_at_period_end` flag and returns the
    /// refreshed snapshot. The provider response is the source of truth.
    async fn set_cancel_at_period_end(
        &self,
        record: &SubscriptionRecord,
        cancel: bool,
    ) -> Res<SubscriptionRecord>;
}

/// Stripe-backed implementation of [`BillingProvider`].
pub struct StripeBilling {
    client: stripe::Client,
}

impl StripeBilling {
    pub fn new(secret_key: &str) -> Self {
        StripeBilling {
            client: stripe::Client::new(secret_key),
        }
    }
}

fn derive_status(status: stripe::SubscriptionStatus, cancel_at_period_end: bool) -> SubscriptionStatus {
    match status {
        stripe::SubscriptionStatus::Canceled => SubscriptionStatus::Canceled,
        _ if cancel_at_period_end => SubscriptionStatus::PendingCancel,
        _ => SubscriptionStatus::Active,
    }
}

fn to_record(subscription: &Subscription, user_id: &str) -> SubscriptionRecord {
    let customer_id = match &subscription.customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    };

    SubscriptionRecord {
        id: subscription.id.to_string(),
        user_id: user_id.to_string(),
        customer_id,
        status: derive_status(subscription.status, subscription.cancel_at_period_end),
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
    }
}

fn to_customer(customer: &Customer) -> BillingCustomer {
    BillingCustomer {
        id: customer.id.to_string(),
        email: customer.email.clone(),
        google_email: customer
            .metadata
            .as_ref()
            .and_then(|meta| meta.get("google_email").cloned()),
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_customer(&self, params: CreateCustomerParams) -> Res<BillingCustomer> {
        let token = params
            .source_token
            .parse::<stripe::TokenId>()
            .map_err(|e| AppError::BadRequest(format!("Invalid payment token: {}", e)))?;

        let mut metadata = HashMap::new();
        metadata.insert("google_email".to_string(), params.google_email.clone());

        let create = CreateCustomer {
            description: Some(&params.description),
            email: Some(&params.email),
            source: Some(PaymentSourceParams::Token(token)),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(&self.client, create)
            .await
            .map_err(AppError::from)?;

        Ok(to_customer(&customer))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Res<BillingCustomer> {
        let id = customer_id.parse::<CustomerId>().map_err(|e| {
            AppError::Internal(format!(
                "Failed to parse customer id: {}. {}",
                customer_id, e
            ))
        })?;

        let customer = Customer::retrieve(&self.client, &id, &[])
            .await
            .map_err(AppError::from)?;

        Ok(to_customer(&customer))
    }

    async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
    ) -> Res<SubscriptionRecord> {
        let customer_id = params
            .customer_id
            .parse::<CustomerId>()
            .map_err(|e| AppError::Internal(format!("Invalid customer ID: {}", e)))?;

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), params.user_id.clone());

        let mut create = CreateSubscription::new(customer_id);
        create.items = Some(vec![CreateSubscriptionItems {
            price: Some(params.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        create.metadata = Some(metadata);

        let subscription = Subscription::create(&self.client, create)
            .await
            .map_err(AppError::from)?;

        Ok(to_record(&subscription, &params.user_id))
    }

    async fn set_cancel_at_period_end(
        &self,
        record: &SubscriptionRecord,
        cancel: bool,
    ) -> Res<SubscriptionRecord> {
        let sub_id = record
            .id
            .parse::<SubscriptionId>()
            .map_err(|e| AppError::BadRequest(format!("Invalid subscription ID: {}", e)))?;

        let subscription = Subscription::update(
            &self.client,
            &sub_id,
            UpdateSubscription {
                cancel_at_period_end: Some(cancel),
                ..Default::default()
            },
        )
        .await
        .map_err(AppError::from)?;

        Ok(to_record(&subscription, &record.user_id))
    }
}
