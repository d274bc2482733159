//! Payment provider port.
//!
//! The provider is an external capability: this crate never speaks HTTP to
//! it. Implement [`PaymentProvider`] over your provider's API client; a
//! scriptable mock is available for testing.
//!
//! Provider state strings are normalized by the reconciler's mapping table
//! (`COMPLETED`, `CANCELLED`, `FAILED`, anything else is a non-transition),
//! so implementations should pass states through untouched.

use crate::error::Result;
use async_trait::async_trait;

/// Request to create a payment or recurring-debit agreement at the provider.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    /// Amount to collect.
    pub amount: f64,
    /// Currency of `amount`.
    pub currency: String,
    /// Customer reference passed to the provider.
    pub customer_id: String,
    /// Human-readable order description shown on the hosted page.
    pub description: String,
}

/// Handle returned by the provider for a created payment request.
#[derive(Debug, Clone)]
pub struct PaymentRequestHandle {
    /// Provider-side payment/agreement ID.
    pub id: String,
    /// Hosted payment link for the customer.
    pub link: Option<String>,
}

/// Provider-side payment state, as returned by a status poll.
#[derive(Debug, Clone)]
pub struct ProviderPaymentState {
    /// Provider-specific state string (e.g. `COMPLETED`).
    pub state: String,
    /// Raw provider payload, attached to transactions verbatim.
    pub payload: serde_json::Value,
}

/// Trait for payment-provider operations.
///
/// Implement this trait to integrate a real provider. A mock
/// implementation is available for testing.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment request or recurring agreement.
    async fn create_payment_request(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentRequestHandle>;

    /// Fetch the current state of a payment by its provider-side ID.
    async fn get_payment_status(&self, payment_id: &str) -> Result<ProviderPaymentState>;
}

/// Mock payment provider for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use crate::error::BillingError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};

    /// Scriptable mock payment provider.
    ///
    /// Created requests get sequential `pay_N` IDs; statuses are scripted
    /// per payment ID with [`set_state`](MockPaymentProvider::set_state).
    #[derive(Default, Clone)]
    pub struct MockPaymentProvider {
        inner: Arc<MockPaymentProviderInner>,
    }

    #[derive(Default)]
    struct MockPaymentProviderInner {
        states: RwLock<HashMap<String, String>>,
        create_calls: AtomicUsize,
        status_calls: AtomicUsize,
        fail_create: AtomicBool,
        fail_status: AtomicBool,
    }

    #[async_trait]
    impl PaymentProvider for MockPaymentProvider {
        async fn create_payment_request(
            &self,
            _request: CreatePaymentRequest,
        ) -> Result<PaymentRequestHandle> {
            let n = self.inner.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.inner.fail_create.load(Ordering::SeqCst) {
                return Err(BillingError::provider(
                    "create_payment_request",
                    "mock provider unavailable",
                ));
            }
            let id = format!("pay_{}", n);
            self.inner
                .states
                .write()
                .unwrap()
                .insert(id.clone(), "PENDING".to_string());
            Ok(PaymentRequestHandle {
                link: Some(format!("https://pay.example/{}", id)),
                id,
            })
        }

        async fn get_payment_status(&self, payment_id: &str) -> Result<ProviderPaymentState> {
            self.inner.status_calls.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_status.load(Ordering::SeqCst) {
                return Err(BillingError::provider(
                    "get_payment_status",
                    "mock provider unavailable",
                ));
            }
            let states = self.inner.states.read().unwrap();
            let state = states.get(payment_id).cloned().ok_or_else(|| {
                BillingError::not_found(format!("Payment not found: {}", payment_id))
            })?;
            Ok(ProviderPaymentState {
                payload: serde_json::json!({ "id": payment_id, "state": state }),
                state,
            })
        }
    }

    impl MockPaymentProvider {
        /// Create a new mock provider.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the state returned for a payment ID.
        pub fn set_state(&self, payment_id: &str, state: &str) {
            self.inner
                .states
                .write()
                .unwrap()
                .insert(payment_id.to_string(), state.to_string());
        }

        /// Make `create_payment_request` fail until reset.
        pub fn fail_create(&self, fail: bool) {
            self.inner.fail_create.store(fail, Ordering::SeqCst);
        }

        /// Make `get_payment_status` fail until reset.
        pub fn fail_status(&self, fail: bool) {
            self.inner.fail_status.store(fail, Ordering::SeqCst);
        }

        /// Number of `create_payment_request` calls seen.
        pub fn create_calls(&self) -> usize {
            self.inner.create_calls.load(Ordering::SeqCst)
        }

        /// Number of `get_payment_status` calls seen.
        pub fn status_calls(&self) -> usize {
            self.inner.status_calls.load(Ordering::SeqCst)
        }
    }
}
