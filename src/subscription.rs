//! Subscription lifecycle management.
//!
//! Handles subscription creation, partial edits, deletion, and the status
//! machine. Creation delegates invoice generation to [`InvoiceGenerator`]
//! as part of the same logical operation.

use chrono::{Months, NaiveDate};
use serde_json::json;
use uuid::Uuid;

use crate::error::{BillingError, Result};
use crate::invoice::{GenerateInvoiceRequest, GeneratedInvoice, InvoiceGenerator};
use crate::notify::Notifier;
use crate::provider::PaymentProvider;
use crate::storage::{
    BillingStore, Catalog, PaymentMethod, Subscription, SubscriptionStatus,
};

/// Request to create a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    /// Subscribing customer; must resolve through the catalog.
    pub customer_id: String,
    /// Subscribed product; must resolve through the catalog.
    pub product_id: String,
    /// First day of the term, `YYYY-MM-DD`.
    pub start_date: String,
    /// How the term gets settled.
    pub payment_method: PaymentMethod,
}

/// Partial update to a subscription.
///
/// Absent fields are left untouched. Reminder flags are not updatable
/// through this path; they are owned by the reminder scheduler and only
/// move false -> true.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscription {
    pub product_name: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub duration_months: Option<u32>,
    pub payment_method: Option<PaymentMethod>,
}

/// Result of subscription creation: the subscription with its invoice
/// linkage applied, plus the invoice generation outcome.
#[derive(Debug, Clone)]
#[must_use]
pub struct SubscriptionCreation {
    pub subscription: Subscription,
    pub invoice: GeneratedInvoice,
}

/// Subscription lifecycle operations.
pub struct SubscriptionManager<S, C, P, N> {
    store: S,
    catalog: C,
    invoices: InvoiceGenerator<S, C, P, N>,
}

impl<S, C, P, N> SubscriptionManager<S, C, P, N>
where
    S: BillingStore,
    C: Catalog,
    P: PaymentProvider,
    N: Notifier,
{
    /// Create a new subscription manager.
    #[must_use]
    pub fn new(store: S, catalog: C, invoices: InvoiceGenerator<S, C, P, N>) -> Self {
        Self {
            store,
            catalog,
            invoices,
        }
    }

    /// Create a subscription and its invoice.
    ///
    /// The end date is the start date advanced by the product's term in
    /// calendar months; a start on a day the target month lacks lands on
    /// that month's last day (Jan 31 + 1 month = Feb 28/29).
    ///
    /// The subscription is persisted before invoice generation. If the
    /// invoice cannot be generated the error surfaces to the caller while
    /// the subscription stays stored in `Pending`, so the invoice can be
    /// retried without re-creating the subscription. There is no
    /// compensation pass for a crash between the two writes.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unparseable start date, not-found
    /// for unknown customer/product IDs, and whatever invoice generation
    /// returns for the second step.
    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionCreation> {
        let start_date = NaiveDate::parse_from_str(&request.start_date, "%Y-%m-%d")
            .map_err(|_| {
                BillingError::validation(format!("Invalid start date: {}", request.start_date))
            })?;

        let customer = self
            .catalog
            .get_customer(&request.customer_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(format!("Customer not found: {}", request.customer_id))
            })?;
        let product = self
            .catalog
            .get_product(&request.product_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(format!("Product not found: {}", request.product_id))
            })?;

        let end_date = start_date
            .checked_add_months(Months::new(product.duration_months))
            .ok_or_else(|| BillingError::validation("End date out of representable range"))?;

        let status = match request.payment_method {
            PaymentMethod::Manual => SubscriptionStatus::Active,
            _ => SubscriptionStatus::Pending,
        };

        let mut subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.id.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            duration_months: product.duration_months,
            start_date,
            end_date,
            price: product.price,
            currency: product.currency.clone(),
            status,
            payment_method: request.payment_method,
            invoice_id: None,
            external_agreement_id: None,
            reminder_10_sent: false,
            reminder_5_sent: false,
        };
        self.store.save_subscription(&subscription).await?;

        let generated = self
            .invoices
            .generate(GenerateInvoiceRequest {
                customer_id: customer.id.clone(),
                amount: product.price,
                currency: product.currency.clone(),
                due_date: start_date,
                payment_method: request.payment_method,
                subscription_id: Some(subscription.id.clone()),
                metadata: json!({ "product_id": product.id }),
            })
            .await;

        let generated = match generated {
            Ok(generated) => generated,
            Err(err) => {
                tracing::warn!(
                    target: "subcurrent::subscription",
                    subscription_id = %subscription.id,
                    error = %err,
                    "invoice generation failed; subscription left pending for retry"
                );
                return Err(err);
            }
        };

        subscription.invoice_id = Some(generated.invoice.id.clone());
        subscription.external_agreement_id = generated.agreement_id.clone();
        self.store.save_subscription(&subscription).await?;

        tracing::info!(
            target: "subcurrent::subscription",
            subscription_id = %subscription.id,
            invoice_id = %generated.invoice.id,
            status = %subscription.status,
            end_date = %subscription.end_date,
            "subscription created"
        );

        Ok(SubscriptionCreation {
            subscription,
            invoice: generated,
        })
    }

    /// Get a subscription by ID.
    pub async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        self.store.get_subscription(id).await
    }

    /// Apply a partial update to a subscription.
    ///
    /// The end date is NOT recomputed when `start_date` or
    /// `duration_months` change; edits through this path leave the expiry
    /// where subscription creation put it. Observed behavior, kept as is.
    pub async fn update_subscription(
        &self,
        id: &str,
        update: UpdateSubscription,
    ) -> Result<Subscription> {
        let mut subscription = self
            .store
            .get_subscription(id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("Subscription not found: {}", id)))?;

        if let Some(product_name) = update.product_name {
            subscription.product_name = product_name;
        }
        if let Some(price) = update.price {
            subscription.price = price;
        }
        if let Some(currency) = update.currency {
            subscription.currency = currency;
        }
        if let Some(start_date) = update.start_date {
            subscription.start_date = start_date;
        }
        if let Some(duration_months) = update.duration_months {
            subscription.duration_months = duration_months;
        }
        if let Some(payment_method) = update.payment_method {
            subscription.payment_method = payment_method;
        }

        self.store.save_subscription(&subscription).await?;
        Ok(subscription)
    }

    /// Delete a subscription.
    ///
    /// Does not cascade to the linked invoice; invoices live and die
    /// independently.
    pub async fn delete_subscription(&self, id: &str) -> Result<()> {
        if self.store.get_subscription(id).await?.is_none() {
            return Err(BillingError::not_found(format!(
                "Subscription not found: {}",
                id
            )));
        }
        self.store.delete_subscription(id).await
    }

    /// Move a subscription to a new status, enforcing the status machine.
    ///
    /// Allowed: `Pending -> Active` (payment confirmed), `Pending ->
    /// Cancelled` (provider cancellation/failure), `Active -> Expired`
    /// (term ended). Same-status calls are no-ops; everything else is an
    /// invalid transition.
    pub async fn set_status(&self, id: &str, status: SubscriptionStatus) -> Result<Subscription> {
        let mut subscription = self
            .store
            .get_subscription(id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("Subscription not found: {}", id)))?;

        if subscription.status == status {
            return Ok(subscription);
        }
        if !subscription.status.can_transition_to(status) {
            return Err(BillingError::invalid_transition(format!(
                "Subscription {} cannot move {} -> {}",
                id, subscription.status, status
            )));
        }

        tracing::info!(
            target: "subcurrent::subscription",
            subscription_id = %id,
            from = %subscription.status,
            to = %status,
            "subscription status transition"
        );
        subscription.status = status;
        self.store.save_subscription(&subscription).await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test::MockNotifier;
    use crate::provider::test::MockPaymentProvider;
    use crate::storage::test::InMemoryBillingStore;
    use crate::storage::{Customer, InvoiceStatus, Product};

    type Manager = SubscriptionManager<
        InMemoryBillingStore,
        InMemoryBillingStore,
        MockPaymentProvider,
        MockNotifier,
    >;

    fn manager(store: &InMemoryBillingStore, provider: &MockPaymentProvider) -> Manager {
        store.seed_customers(vec![Customer {
            id: "cus_1".to_string(),
            name: "Jens Hansen".to_string(),
            email: "jens@example.dk".to_string(),
        }]);
        store.seed_products(vec![
            Product {
                id: "prod_1".to_string(),
                name: "Hosting".to_string(),
                price: 99.0,
                currency: "DKK".to_string(),
                duration_months: 1,
            },
            Product {
                id: "prod_12".to_string(),
                name: "Hosting, annual".to_string(),
                price: 950.0,
                currency: "DKK".to_string(),
                duration_months: 12,
            },
        ]);
        let generator = InvoiceGenerator::new(
            store.clone(),
            store.clone(),
            provider.clone(),
            MockNotifier::new(),
        );
        SubscriptionManager::new(store.clone(), store.clone(), generator)
    }

    fn create_request(product_id: &str, start: &str, method: PaymentMethod) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: "cus_1".to_string(),
            product_id: product_id.to_string(),
            start_date: start.to_string(),
            payment_method: method,
        }
    }

    #[tokio::test]
    async fn test_manual_creation_is_active_with_pending_invoice() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let created = manager
            .create_subscription(create_request("prod_1", "2024-01-01", PaymentMethod::Manual))
            .await
            .unwrap();

        let sub = &created.subscription;
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.product_name, "Hosting");
        assert_eq!(sub.end_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(sub.invoice_id.is_some());
        assert!(sub.external_agreement_id.is_none());

        let invoice = &created.invoice.invoice;
        assert_eq!(invoice.amount, 99.0);
        assert_eq!(invoice.currency, "DKK");
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.payment_method, PaymentMethod::Manual);
        assert_eq!(invoice.metadata["subscription_id"], sub.id.as_str());
    }

    #[tokio::test]
    async fn test_provider_creation_is_pending_with_agreement() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let created = manager
            .create_subscription(create_request(
                "prod_1",
                "2024-01-01",
                PaymentMethod::ProviderRecurring,
            ))
            .await
            .unwrap();

        assert_eq!(created.subscription.status, SubscriptionStatus::Pending);
        assert_eq!(
            created.subscription.external_agreement_id.as_deref(),
            Some("pay_1")
        );
        assert!(created.invoice.payment_link.is_some());
    }

    #[tokio::test]
    async fn test_month_end_clamp() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        // 2024 is a leap year: Jan 31 + 1 month clamps to Feb 29
        let created = manager
            .create_subscription(create_request("prod_1", "2024-01-31", PaymentMethod::Manual))
            .await
            .unwrap();
        assert_eq!(
            created.subscription.end_date,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );

        // Non-leap year clamps to Feb 28
        let created = manager
            .create_subscription(create_request("prod_1", "2023-01-31", PaymentMethod::Manual))
            .await
            .unwrap();
        assert_eq!(
            created.subscription.end_date,
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );

        // Annual term keeps the day
        let created = manager
            .create_subscription(create_request("prod_12", "2024-03-15", PaymentMethod::Manual))
            .await
            .unwrap();
        assert_eq!(
            created.subscription.end_date,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_ids_abort_before_mutation() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let mut req = create_request("prod_1", "2024-01-01", PaymentMethod::Manual);
        req.customer_id = "cus_missing".to_string();
        assert!(matches!(
            manager.create_subscription(req).await.unwrap_err(),
            BillingError::NotFound(_)
        ));

        let req = create_request("prod_missing", "2024-01-01", PaymentMethod::Manual);
        assert!(matches!(
            manager.create_subscription(req).await.unwrap_err(),
            BillingError::NotFound(_)
        ));

        let req = create_request("prod_1", "01/31/2024", PaymentMethod::Manual);
        assert!(matches!(
            manager.create_subscription(req).await.unwrap_err(),
            BillingError::Validation(_)
        ));

        assert!(store.list_active_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoice_failure_leaves_pending_subscription() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);
        provider.fail_create(true);

        let err = manager
            .create_subscription(create_request(
                "prod_1",
                "2024-01-01",
                PaymentMethod::ProviderRecurring,
            ))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // The two-step design: the subscription exists, pending, unlinked.
        let all = store.get_all_subscriptions();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SubscriptionStatus::Pending);
        assert!(all[0].invoice_id.is_none());

        provider.fail_create(false);
        let created = manager
            .create_subscription(create_request(
                "prod_1",
                "2024-01-01",
                PaymentMethod::ProviderRecurring,
            ))
            .await
            .unwrap();
        assert!(created.subscription.invoice_id.is_some());
    }

    #[tokio::test]
    async fn test_update_does_not_recompute_end_date_or_touch_flags() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let created = manager
            .create_subscription(create_request("prod_1", "2024-01-01", PaymentMethod::Manual))
            .await
            .unwrap();
        let id = created.subscription.id.clone();
        let original_end = created.subscription.end_date;

        // Simulate reminder flags already set by the scheduler
        let mut flagged = created.subscription.clone();
        flagged.reminder_10_sent = true;
        store.save_subscription(&flagged).await.unwrap();

        let updated = manager
            .update_subscription(
                &id,
                UpdateSubscription {
                    start_date: Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
                    duration_months: Some(6),
                    price: Some(120.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.start_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(updated.duration_months, 6);
        assert_eq!(updated.price, 120.0);
        // end date deliberately untouched
        assert_eq!(updated.end_date, original_end);
        // flags are monotonic through this path
        assert!(updated.reminder_10_sent);
    }

    #[tokio::test]
    async fn test_delete_does_not_cascade_to_invoice() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let created = manager
            .create_subscription(create_request("prod_1", "2024-01-01", PaymentMethod::Manual))
            .await
            .unwrap();
        let invoice_id = created.subscription.invoice_id.clone().unwrap();

        manager.delete_subscription(&created.subscription.id).await.unwrap();

        assert!(store
            .get_subscription(&created.subscription.id)
            .await
            .unwrap()
            .is_none());
        assert!(store.get_invoice(&invoice_id).await.unwrap().is_some());

        assert!(matches!(
            manager.delete_subscription("sub_missing").await.unwrap_err(),
            BillingError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_status_machine_enforced() {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let manager = manager(&store, &provider);

        let created = manager
            .create_subscription(create_request(
                "prod_1",
                "2024-01-01",
                PaymentMethod::ProviderManual,
            ))
            .await
            .unwrap();
        let id = created.subscription.id.clone();
        assert_eq!(created.subscription.status, SubscriptionStatus::Pending);

        // pending -> active
        let sub = manager.set_status(&id, SubscriptionStatus::Active).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);

        // active -> pending is invalid
        assert!(matches!(
            manager
                .set_status(&id, SubscriptionStatus::Pending)
                .await
                .unwrap_err(),
            BillingError::InvalidTransition(_)
        ));

        // active -> expired, then terminal
        manager.set_status(&id, SubscriptionStatus::Expired).await.unwrap();
        assert!(matches!(
            manager
                .set_status(&id, SubscriptionStatus::Active)
                .await
                .unwrap_err(),
            BillingError::InvalidTransition(_)
        ));

        // same-status call is a no-op
        let sub = manager.set_status(&id, SubscriptionStatus::Expired).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }
}
