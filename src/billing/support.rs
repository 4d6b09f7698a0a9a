//! Shared mock implementations of the service ports, used across the
//! module tests. Each mock records calls so tests can assert what was and
//! was not reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::billing::models::sub::{BillingCustomer, SubscriptionRecord, SubscriptionStatus};
use crate::billing::provider::{BillingProvider, CreateCustomerParams, CreateSubscriptionParams};
use crate::common::error::{AppError, Res};
use crate::events::ReloadPublisher;
use crate::identity::{GoogleIdentity, IdentityVerifier};
use crate::mailer::EmailTransport;
use crate::store::SubscriptionStore;

pub(crate) fn record(
    user_id: &str,
    current_period_end: i64,
    cancel_at_period_end: bool,
) -> SubscriptionRecord {
    SubscriptionRecord {
        id: format!("sub_{}", user_id),
        user_id: user_id.to_string(),
        customer_id: format!("cus_{}", user_id),
        status: if cancel_at_period_end {
            SubscriptionStatus::PendingCancel
        } else {
            SubscriptionStatus::Active
        },
        current_period_end,
        cancel_at_period_end,
    }
}

// === store ===

#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<HashMap<String, SubscriptionRecord>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(record: SubscriptionRecord) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .insert(record.user_id.clone(), record);
        store
    }

    pub(crate) fn snapshot(&self, user_id: &str) -> Option<SubscriptionRecord> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Res<Option<SubscriptionRecord>> {
        Ok(self.records.lock().unwrap().get(user_id).cloned())
    }

    async fn set(&self, record: &SubscriptionRecord) -> Res<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}

// === identity ===

pub(crate) struct MockVerifier {
    identity: Option<GoogleIdentity>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub(crate) fn accepting(id: &str) -> Self {
        MockVerifier {
            identity: Some(GoogleIdentity {
                id: id.to_string(),
                email: Some(format!("{}@example.com", id)),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        MockVerifier {
            identity: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn verify(&self, _access_token: &str) -> Res<GoogleIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.identity
            .clone()
            .ok_or_else(|| AppError::Internal("identity provider unreachable".to_string()))
    }
}

// === billing provider ===

#[derive(Default)]
pub(crate) struct MockBilling {
    pub(crate) next_customer: Mutex<Option<BillingCustomer>>,
    pub(crate) next_subscription: Mutex<Option<SubscriptionRecord>>,
    pub(crate) fail_create_customer: bool,
    pub(crate) fail_create_subscription: bool,
    pub(crate) fail_update: bool,
    pub(crate) fail_retrieve: bool,
    calls: Mutex<Vec<String>>,
    last_customer_params: Mutex<Option<CreateCustomerParams>>,
    last_subscription_params: Mutex<Option<CreateSubscriptionParams>>,
}

impl MockBilling {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_customer(customer: BillingCustomer) -> Self {
        let mock = Self::default();
        *mock.next_customer.lock().unwrap() = Some(customer);
        mock
    }

    pub(crate) fn failing_create_customer() -> Self {
        MockBilling {
            fail_create_customer: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_update() -> Self {
        MockBilling {
            fail_update: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_create_subscription() -> Self {
        MockBilling {
            fail_create_subscription: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_retrieve() -> Self {
        MockBilling {
            fail_retrieve: true,
            ..Self::default()
        }
    }

    pub(crate) fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    pub(crate) fn last_customer_params(&self) -> Option<CreateCustomerParams> {
        self.last_customer_params.lock().unwrap().clone()
    }

    pub(crate) fn last_subscription_params(&self) -> Option<CreateSubscriptionParams> {
        self.last_subscription_params.lock().unwrap().clone()
    }

    fn log(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn create_customer(&self, params: CreateCustomerParams) -> Res<BillingCustomer> {
        self.log("create_customer");
        *self.last_customer_params.lock().unwrap() = Some(params.clone());
        if self.fail_create_customer {
            return Err(AppError::Internal("customer creation refused".to_string()));
        }
        Ok(self
            .next_customer
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(BillingCustomer {
                id: "cus_mock".to_string(),
                email: Some(params.email),
                google_email: Some(params.google_email),
            }))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Res<BillingCustomer> {
        self.log("retrieve_customer");
        if self.fail_retrieve {
            return Err(AppError::Internal(format!(
                "no such customer: {}",
                customer_id
            )));
        }
        self.next_customer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Internal(format!("no such customer: {}", customer_id)))
    }

    async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
    ) -> Res<SubscriptionRecord> {
        self.log("create_subscription");
        *self.last_subscription_params.lock().unwrap() = Some(params.clone());
        if self.fail_create_subscription {
            return Err(AppError::Internal("subscription creation refused".to_string()));
        }
        Ok(self
            .next_subscription
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(SubscriptionRecord {
                id: "sub_mock".to_string(),
                user_id: params.user_id,
                customer_id: params.customer_id,
                status: SubscriptionStatus::Active,
                current_period_end: 1767225600,
                cancel_at_period_end: false,
            }))
    }

    async fn set_cancel_at_period_end(
        &self,
        record: &SubscriptionRecord,
        cancel: bool,
    ) -> Res<SubscriptionRecord> {
        self.log("set_cancel_at_period_end");
        if self.fail_update {
            return Err(AppError::Internal("provider update refused".to_string()));
        }
        if let Some(next) = self.next_subscription.lock().unwrap().clone() {
            return Ok(next);
        }
        let mut updated = record.clone();
        updated.cancel_at_period_end = cancel;
        updated.status = if cancel {
            SubscriptionStatus::PendingCancel
        } else {
            SubscriptionStatus::Active
        };
        Ok(updated)
    }
}

// === reload bus ===

#[derive(Default)]
pub(crate) struct CountingReload {
    count: AtomicUsize,
}

impl CountingReload {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadPublisher for CountingReload {
    async fn publish_reload(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

// === mailer ===

#[derive(Default)]
pub(crate) struct MockMailer {
    pub(crate) fail: bool,
    sent: Mutex<Vec<(Vec<String>, Vec<u8>)>>,
}

impl MockMailer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        MockMailer {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<(Vec<String>, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for MockMailer {
    async fn send(&self, recipients: &[String], body: &[u8]) -> Res<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), body.to_vec()));
        if self.fail {
            return Err(AppError::Internal("mail transport unavailable".to_string()));
        }
        Ok(())
    }
}
