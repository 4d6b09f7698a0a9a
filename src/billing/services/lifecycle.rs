//! Subscription state transitions against the billing provider.
//!
//! Every successful transition runs three effects in order: the provider
//! call, a store write of the object the provider returned, and a reload
//! publish. The store write and the publish are best-effort; once the
//! provider call has succeeded they are never rolled back.

use std::sync::Arc;

use log::{error, info};

use crate::billing::dtos::sub::UpgradeForm;
use crate::billing::models::sub::{SubscriptionRecord, SubscriptionStatus};
use crate::billing::provider::{BillingProvider, CreateCustomerParams, CreateSubscriptionParams};
use crate::common::error::{AppError, Res};
use crate::events::ReloadPublisher;
use crate::store::SubscriptionStore;

pub struct Lifecycle {
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn SubscriptionStore>,
    reload: Arc<dyn ReloadPublisher>,
    plan_id: String,
    support_email: String,
}

impl Lifecycle {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        store: Arc<dyn SubscriptionStore>,
        reload: Arc<dyn ReloadPublisher>,
        plan_id: String,
        support_email: String,
    ) -> Self {
        Lifecycle {
            provider,
            store,
            reload,
            plan_id,
            support_email,
        }
    }

    /// First payment: create a customer carrying the identity email, then
    /// the subscription carrying the user id, then propagate.
    ///
    /// The two provider calls are not transactional. When the second fails,
    /// the already-created customer stays behind with no subscription; that
    /// inconsistency is only surfaced through the error log.
    pub async fn upgrade(&self, form: &UpgradeForm) -> Res<SubscriptionRecord> {
        if let Some(existing) = self.store.get(&form.user_id).await? {
            if existing.status != SubscriptionStatus::Canceled {
                return Err(AppError::BadRequest(
                    "This user already has a subscription.".to_string(),
                ));
            }
        }

        let billing_email = form
            .billing_email
            .clone()
            .unwrap_or_else(|| form.user_email.clone());

        let customer = self
            .provider
            .create_customer(CreateCustomerParams {
                email: billing_email,
                description: format!("Customer for Google email: {}", form.user_email),
                source_token: form.payment_token.clone(),
                google_email: form.user_email.clone(),
            })
            .await?;
        info!("Created billing customer {} for {}", customer.id, form.user_id);

        let subscription = match self
            .provider
            .create_subscription(CreateSubscriptionParams {
                customer_id: customer.id.clone(),
                price_id: self.plan_id.clone(),
                user_id: form.user_id.clone(),
            })
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(
                    "Subscription creation failed for {}; customer {} is left without a \
                     subscription: {}",
                    form.user_id, customer.id, err
                );
                return Err(err);
            }
        };
        info!(
            "Created subscription {} for {}",
            subscription.id, form.user_id
        );

        self.propagate(&subscription).await;
        Ok(subscription)
    }

    /// Schedules cancellation at the end of the current period.
    pub async fn cancel(&self, current: &SubscriptionRecord) -> Res<SubscriptionRecord> {
        if current.cancel_at_period_end {
            return Err(AppError::BadRequest(format!(
                "This subscription has already been canceled, it will end on {}. Until then, \
                 you can continue using the paid version of the app.",
                current.period_end_rfc3339()
            )));
        }

        let updated = match self.provider.set_cancel_at_period_end(current, true).await {
            Ok(updated) => updated,
            Err(err) => {
                error!(
                    "Failed to cancel subscription {} for {}: {}",
                    current.id, current.user_id, err
                );
                return Err(AppError::Provider(format!(
                    "Failed to cancel the subscription. Please try again or contact {}",
                    self.support_email
                )));
            }
        };
        info!("Canceled subscription for {}", current.user_id);

        self.propagate(&updated).await;
        Ok(updated)
    }

    /// Clears a scheduled cancellation.
    pub async fn resume(&self, current: &SubscriptionRecord) -> Res<SubscriptionRecord> {
        if !current.cancel_at_period_end {
            return Err(AppError::BadRequest(
                "This subscription is not currently canceled, there is nothing to resume."
                    .to_string(),
            ));
        }

        let updated = match self.provider.set_cancel_at_period_end(current, false).await {
            Ok(updated) => updated,
            Err(err) => {
                error!(
                    "Failed to resume subscription {} for {}: {}",
                    current.id, current.user_id, err
                );
                return Err(AppError::Provider(format!(
                    "Failed to resume the subscription. Please try again or contact {}",
                    self.support_email
                )));
            }
        };
        info!("Resumed subscription for {}", current.user_id);

        self.propagate(&updated).await;
        Ok(updated)
    }

    // store write + reload publish, best-effort
    async fn propagate(&self, record: &SubscriptionRecord) {
        if let Err(err) = self.store.set(record).await {
            error!(
                "Failed to store subscription {} for {}: {}",
                record.id, record.user_id, err
            );
        }
        self.reload.publish_reload().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::support::{record, CountingReload, MemoryStore, MockBilling};

    fn form(user_id: &str) -> UpgradeForm {
        UpgradeForm {
            user_id: user_id.to_string(),
            user_email: format!("{}@gmail.com", user_id),
            success_url: "https://app.example/success".to_string(),
            failure_url: "https://app.example/failure".to_string(),
            payment_token: "tok_visa".to_string(),
            billing_email: Some(format!("{}@billing.example", user_id)),
        }
    }

    struct Fixture {
        provider: Arc<MockBilling>,
        store: Arc<MemoryStore>,
        reload: Arc<CountingReload>,
        lifecycle: Lifecycle,
    }

    fn fixture(provider: MockBilling, store: MemoryStore) -> Fixture {
        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let reload = Arc::new(CountingReload::new());
        let lifecycle = Lifecycle::new(
            provider.clone(),
            store.clone(),
            reload.clone(),
            "price_paid_plan".to_string(),
            "support@app.example".to_string(),
        );
        Fixture {
            provider,
            store,
            reload,
            lifecycle,
        }
    }

    #[tokio::test]
    async fn cancel_when_already_pending_never_calls_provider() {
        let current = record("user-1", 1704067200, true);
        let fx = fixture(MockBilling::new(), MemoryStore::with(current.clone()));

        let err = fx.lifecycle.cancel(&current).await.unwrap_err();

        match err {
            AppError::BadRequest(message) => {
                assert!(message.contains("2024-01-01T00:00:00Z"), "{}", message);
            }
            other => panic!("expected BadRequest, got {:?}", other),
        }
        assert_eq!(fx.provider.call_count("set_cancel_at_period_end"), 0);
        assert_eq!(fx.store.writes(), 0);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn resume_when_not_pending_never_calls_provider() {
        let current = record("user-1", 1704067200, false);
        let fx = fixture(MockBilling::new(), MemoryStore::with(current.clone()));

        let err = fx.lifecycle.resume(&current).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(fx.provider.call_count("set_cancel_at_period_end"), 0);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn cancel_stores_the_provider_response_not_the_local_copy() {
        let current = record("user-1", 1704067200, false);
        // provider reports a different period end than the cached snapshot
        let mut from_provider = record("user-1", 1735689600, true);
        from_provider.id = current.id.clone();

        let provider = MockBilling::new();
        *provider.next_subscription.lock().unwrap() = Some(from_provider.clone());
        let fx = fixture(provider, MemoryStore::with(current.clone()));

        let updated = fx.lifecycle.cancel(&current).await.unwrap();

        assert_eq!(updated, from_provider);
        assert_eq!(fx.store.snapshot("user-1"), Some(from_provider));
        assert_eq!(fx.store.writes(), 1);
        assert_eq!(fx.reload.count(), 1);
    }

    #[tokio::test]
    async fn cancel_provider_failure_names_support_contact_and_mutates_nothing() {
        let current = record("user-1", 1704067200, false);
        let fx = fixture(
            MockBilling::failing_update(),
            MemoryStore::with(current.clone()),
        );

        let err = fx.lifecycle.cancel(&current).await.unwrap_err();

        match err {
            AppError::Provider(message) => {
                assert!(message.contains("support@app.example"), "{}", message);
            }
            other => panic!("expected Provider, got {:?}", other),
        }
        assert_eq!(fx.store.snapshot("user-1"), Some(current));
        assert_eq!(fx.store.writes(), 0);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn resume_clears_the_flag_and_propagates_once() {
        let current = record("user-1", 1704067200, true);
        let fx = fixture(MockBilling::new(), MemoryStore::with(current.clone()));

        let updated = fx.lifecycle.resume(&current).await.unwrap();

        assert!(!updated.cancel_at_period_end);
        assert_eq!(updated.status, SubscriptionStatus::Active);
        assert_eq!(fx.store.writes(), 1);
        assert_eq!(fx.reload.count(), 1);
    }

    #[tokio::test]
    async fn upgrade_tags_customer_and_subscription_then_propagates() {
        let fx = fixture(MockBilling::new(), MemoryStore::new());

        let created = fx.lifecycle.upgrade(&form("user-9")).await.unwrap();

        assert_eq!(created.user_id, "user-9");
        assert_eq!(fx.provider.call_count("create_customer"), 1);
        assert_eq!(fx.provider.call_count("create_subscription"), 1);
        assert_eq!(fx.store.snapshot("user-9"), Some(created));
        assert_eq!(fx.reload.count(), 1);

        let customer_params = fx.provider.last_customer_params().unwrap();
        assert_eq!(customer_params.google_email, "user-9@gmail.com");
        assert_eq!(customer_params.email, "user-9@billing.example");
        assert_eq!(
            customer_params.description,
            "Customer for Google email: user-9@gmail.com"
        );

        let subscription_params = fx.provider.last_subscription_params().unwrap();
        assert_eq!(subscription_params.user_id, "user-9");
        assert_eq!(subscription_params.price_id, "price_paid_plan");
    }

    #[tokio::test]
    async fn upgrade_failure_after_customer_leaves_no_local_state() {
        let fx = fixture(MockBilling::failing_create_subscription(), MemoryStore::new());

        let result = fx.lifecycle.upgrade(&form("user-9")).await;

        assert!(result.is_err());
        assert_eq!(fx.provider.call_count("create_customer"), 1);
        assert_eq!(fx.store.writes(), 0);
        assert_eq!(fx.store.snapshot("user-9"), None);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn upgrade_customer_failure_stops_before_subscription_create() {
        let fx = fixture(MockBilling::failing_create_customer(), MemoryStore::new());

        let result = fx.lifecycle.upgrade(&form("user-9")).await;

        assert!(result.is_err());
        assert_eq!(fx.provider.call_count("create_subscription"), 0);
        assert_eq!(fx.store.writes(), 0);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn upgrade_rejects_when_a_live_subscription_exists() {
        let fx = fixture(
            MockBilling::new(),
            MemoryStore::with(record("user-9", 1704067200, false)),
        );

        let err = fx.lifecycle.upgrade(&form("user-9")).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(fx.provider.call_count("create_customer"), 0);
    }

    #[tokio::test]
    async fn upgrade_allows_resubscribing_after_a_terminal_cancel() {
        let mut canceled = record("user-9", 1704067200, false);
        canceled.status = SubscriptionStatus::Canceled;
        let fx = fixture(MockBilling::new(), MemoryStore::with(canceled));

        let created = fx.lifecycle.upgrade(&form("user-9")).await.unwrap();

        assert_eq!(created.status, SubscriptionStatus::Active);
        assert_eq!(fx.provider.call_count("create_subscription"), 1);
    }

    #[tokio::test]
    async fn upgrade_uses_identity_email_when_no_billing_email_given() {
        let fx = fixture(MockBilling::new(), MemoryStore::new());

        let mut request = form("user-9");
        request.billing_email = None;

        fx.lifecycle.upgrade(&request).await.unwrap();

        let customer_params = fx.provider.last_customer_params().unwrap();
        assert_eq!(customer_params.email, "user-9@gmail.com");
    }
}
