//! Domain records and storage ports for billing data.
//!
//! Implement [`BillingStore`] and [`Catalog`] to persist billing state to
//! your database. An in-memory implementation is provided for testing.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Payment method
// =============================================================================

/// How an invoice gets settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Settled out of band; marked paid by an operator.
    Manual,
    /// Recurring debit agreement managed by the payment provider.
    ProviderRecurring,
    /// One-off transfer through the payment provider's hosted page.
    ProviderManual,
}

impl PaymentMethod {
    /// Check whether settling this method involves the payment provider.
    #[must_use]
    pub fn is_provider_based(&self) -> bool {
        matches!(self, Self::ProviderRecurring | Self::ProviderManual)
    }

    /// Convert to the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::ProviderRecurring => "provider_recurring",
            Self::ProviderManual => "provider_manual",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Running and paid (or manual).
    Active,
    /// Created, awaiting payment confirmation.
    Pending,
    /// Term ended.
    Expired,
    /// Cancelled before or during the term.
    Cancelled,
}

impl SubscriptionStatus {
    /// Check whether the status machine permits moving to `next`.
    ///
    /// Allowed: `Pending -> Active`, `Pending -> Cancelled`,
    /// `Active -> Expired`. `Cancelled` and `Expired` are terminal.
    /// A same-status move is always permitted (no-op).
    #[must_use]
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Expired)
        )
    }

    /// Convert to the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer's term for a product, with a computed expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    /// Record ID.
    pub id: String,
    /// Owning customer.
    pub customer_id: String,
    /// Subscribed product.
    pub product_id: String,
    /// Product name, denormalized at creation.
    pub product_name: String,
    /// Term length in calendar months.
    pub duration_months: u32,
    /// First day of the term.
    pub start_date: NaiveDate,
    /// Day the term ends. Computed once at creation, immutable thereafter.
    pub end_date: NaiveDate,
    /// Price per term.
    pub price: f64,
    /// Currency of `price`.
    pub currency: String,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// How the term gets settled.
    pub payment_method: PaymentMethod,
    /// Linked invoice, once generated.
    pub invoice_id: Option<String>,
    /// Recurring agreement ID at the payment provider, if any.
    pub external_agreement_id: Option<String>,
    /// Whether the 10-day renewal reminder went out. Monotonic.
    pub reminder_10_sent: bool,
    /// Whether the 5-day renewal reminder went out. Monotonic.
    pub reminder_5_sent: bool,
}

impl Subscription {
    /// Check if the subscription is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Awaiting payment.
    Pending,
    /// Settled in full.
    Paid,
    /// Cancelled or failed at the provider.
    Cancelled,
    /// Paid, then refunded.
    Refunded,
}

impl InvoiceStatus {
    /// Convert to the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A billing record for an amount owed against a subscription or ad hoc sale.
///
/// `amount` and `currency` are fixed at creation; only `status`,
/// `external_payment_id` and `payment_link` change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    /// Record ID.
    pub id: String,
    /// Billed customer.
    pub customer_id: String,
    /// Amount owed.
    pub amount: f64,
    /// Currency of `amount`.
    pub currency: String,
    /// Settlement status.
    pub status: InvoiceStatus,
    /// How the invoice gets settled.
    pub payment_method: PaymentMethod,
    /// Payment/agreement ID at the provider, for provider-based methods.
    pub external_payment_id: Option<String>,
    /// Hosted payment link, for provider-based methods.
    pub payment_link: Option<String>,
    /// When payment is due.
    pub due_date: NaiveDate,
    /// When the invoice was issued.
    pub issued_date: NaiveDate,
    /// Opaque key/value context (originating subscription/product ids, ...).
    pub metadata: serde_json::Value,
}

impl Invoice {
    /// Check if the invoice still awaits payment.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == InvoiceStatus::Pending
    }
}

// =============================================================================
// Payment transaction
// =============================================================================

/// Payment transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Initiated, outcome unknown.
    Pending,
    /// Settled.
    Paid,
    /// Rejected or cancelled at the provider.
    Failed,
}

impl TransactionStatus {
    /// Convert to the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment event tied to an invoice.
///
/// At most one transaction exists per `(invoice_id, transaction_id)` pair;
/// reconciliation updates in place rather than appending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentTransaction {
    /// Record ID.
    pub id: String,
    /// Settled invoice.
    pub invoice_id: String,
    /// Paying customer.
    pub customer_id: String,
    /// Settlement method.
    pub payment_method: PaymentMethod,
    /// Amount moved.
    pub amount: f64,
    /// Currency of `amount`.
    pub currency: String,
    /// Outcome.
    pub status: TransactionStatus,
    /// External reference; the idempotent-upsert key.
    pub transaction_id: String,
    /// Raw provider payload, opaque to this crate.
    pub provider_response: serde_json::Value,
    /// When the event was recorded.
    pub transaction_date: DateTime<Utc>,
}

// =============================================================================
// Catalog entities
// =============================================================================

/// A customer resolved through the [`Catalog`] port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A recurring-service product resolved through the [`Catalog`] port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Price per term.
    pub price: f64,
    /// Currency of `price`.
    pub currency: String,
    /// Term length in calendar months.
    pub duration_months: u32,
}

// =============================================================================
// Ports
// =============================================================================

/// Trait for storing billing records.
///
/// Implement this trait to persist billing state to your database.
#[async_trait]
pub trait BillingStore: Send + Sync {
    // Subscriptions

    /// Get a subscription by ID.
    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>>;

    /// Save/update a subscription.
    async fn save_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Delete a subscription. Does not cascade to its invoice.
    async fn delete_subscription(&self, id: &str) -> Result<()>;

    /// List subscriptions with `Active` status, for the reminder pass.
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>>;

    // Invoices

    /// Get an invoice by ID.
    async fn get_invoice(&self, id: &str) -> Result<Option<Invoice>>;

    /// Save/update an invoice.
    async fn save_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// Delete an invoice, independent of any linked subscription.
    async fn delete_invoice(&self, id: &str) -> Result<()>;

    // Payment transactions

    /// Find the transaction for an invoice by its external reference.
    ///
    /// Reconciliation keys its upsert off this lookup; implementations
    /// must match on the `(invoice_id, transaction_id)` pair.
    async fn find_transaction(
        &self,
        invoice_id: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// Save/update a payment transaction.
    async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()>;
}

/// Read-only resolution of customers and products.
///
/// Implement this trait over whatever owns your customer and product
/// records; subscription creation refuses IDs this port cannot resolve.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a customer by ID.
    async fn get_customer(&self, id: &str) -> Result<Option<Customer>>;

    /// Look up a product by ID.
    async fn get_product(&self, id: &str) -> Result<Option<Product>>;
}

/// In-memory billing store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory billing store and catalog for testing.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemoryBillingStore {
        inner: Arc<InMemoryBillingStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryBillingStoreInner {
        subscriptions: RwLock<HashMap<String, Subscription>>,
        invoices: RwLock<HashMap<String, Invoice>>,
        transactions: RwLock<HashMap<String, PaymentTransaction>>,
        customers: RwLock<HashMap<String, Customer>>,
        products: RwLock<HashMap<String, Product>>,
    }

    impl InMemoryBillingStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed customers for testing.
        pub fn seed_customers(&self, customers: Vec<Customer>) {
            let mut store = self.inner.customers.write().unwrap();
            for customer in customers {
                store.insert(customer.id.clone(), customer);
            }
        }

        /// Seed products for testing.
        pub fn seed_products(&self, products: Vec<Product>) {
            let mut store = self.inner.products.write().unwrap();
            for product in products {
                store.insert(product.id.clone(), product);
            }
        }

        /// Get all subscriptions (for testing).
        pub fn get_all_subscriptions(&self) -> Vec<Subscription> {
            self.inner.subscriptions.read().unwrap().values().cloned().collect()
        }

        /// Get all transactions (for testing).
        pub fn get_all_transactions(&self) -> Vec<PaymentTransaction> {
            self.inner.transactions.read().unwrap().values().cloned().collect()
        }

        /// Get all transactions recorded against one invoice (for testing).
        pub fn transactions_for_invoice(&self, invoice_id: &str) -> Vec<PaymentTransaction> {
            self.inner
                .transactions
                .read()
                .unwrap()
                .values()
                .filter(|t| t.invoice_id == invoice_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl BillingStore for InMemoryBillingStore {
        async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
            Ok(self.inner.subscriptions.read().unwrap().get(id).cloned())
        }

        async fn save_subscription(&self, subscription: &Subscription) -> Result<()> {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .insert(subscription.id.clone(), subscription.clone());
            Ok(())
        }

        async fn delete_subscription(&self, id: &str) -> Result<()> {
            self.inner.subscriptions.write().unwrap().remove(id);
            Ok(())
        }

        async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>> {
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .values()
                .filter(|s| s.is_active())
                .cloned()
                .collect())
        }

        async fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
            Ok(self.inner.invoices.read().unwrap().get(id).cloned())
        }

        async fn save_invoice(&self, invoice: &Invoice) -> Result<()> {
            self.inner
                .invoices
                .write()
                .unwrap()
                .insert(invoice.id.clone(), invoice.clone());
            Ok(())
        }

        async fn delete_invoice(&self, id: &str) -> Result<()> {
            self.inner.invoices.write().unwrap().remove(id);
            Ok(())
        }

        async fn find_transaction(
            &self,
            invoice_id: &str,
            transaction_id: &str,
        ) -> Result<Option<PaymentTransaction>> {
            Ok(self
                .inner
                .transactions
                .read()
                .unwrap()
                .values()
                .find(|t| t.invoice_id == invoice_id && t.transaction_id == transaction_id)
                .cloned())
        }

        async fn save_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
            self.inner
                .transactions
                .write()
                .unwrap()
                .insert(transaction.id.clone(), transaction.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl Catalog for InMemoryBillingStore {
        async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
            Ok(self.inner.customers.read().unwrap().get(id).cloned())
        }

        async fn get_product(&self, id: &str) -> Result<Option<Product>> {
            Ok(self.inner.products.read().unwrap().get(id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use SubscriptionStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Expired));

        assert!(!Active.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Pending));

        // Same-status moves are no-ops, always allowed
        assert!(Cancelled.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Active));
    }

    #[test]
    fn test_payment_method_classification() {
        assert!(!PaymentMethod::Manual.is_provider_based());
        assert!(PaymentMethod::ProviderRecurring.is_provider_based());
        assert!(PaymentMethod::ProviderManual.is_provider_based());
        assert_eq!(PaymentMethod::ProviderRecurring.as_str(), "provider_recurring");
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(SubscriptionStatus::Pending.to_string(), "pending");
        assert_eq!(InvoiceStatus::Refunded.to_string(), "refunded");
        assert_eq!(TransactionStatus::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        use chrono::NaiveDate;
        use test::InMemoryBillingStore;

        let store = InMemoryBillingStore::new();

        assert!(store.get_subscription("sub_1").await.unwrap().is_none());

        let sub = Subscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            product_id: "prod_1".to_string(),
            product_name: "Hosting".to_string(),
            duration_months: 12,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            price: 99.0,
            currency: "DKK".to_string(),
            status: SubscriptionStatus::Active,
            payment_method: PaymentMethod::Manual,
            invoice_id: None,
            external_agreement_id: None,
            reminder_10_sent: false,
            reminder_5_sent: false,
        };

        store.save_subscription(&sub).await.unwrap();
        let loaded = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(loaded.product_name, "Hosting");

        let active = store.list_active_subscriptions().await.unwrap();
        assert_eq!(active.len(), 1);

        store.delete_subscription("sub_1").await.unwrap();
        assert!(store.get_subscription("sub_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_lookup_keys_on_pair() {
        use test::InMemoryBillingStore;

        let store = InMemoryBillingStore::new();

        let txn = PaymentTransaction {
            id: "txn_1".to_string(),
            invoice_id: "inv_1".to_string(),
            customer_id: "cus_1".to_string(),
            payment_method: PaymentMethod::ProviderManual,
            amount: 50.0,
            currency: "DKK".to_string(),
            status: TransactionStatus::Pending,
            transaction_id: "ext_abc".to_string(),
            provider_response: serde_json::json!({}),
            transaction_date: Utc::now(),
        };
        store.save_transaction(&txn).await.unwrap();

        assert!(store
            .find_transaction("inv_1", "ext_abc")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_transaction("inv_1", "ext_other")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_transaction("inv_2", "ext_abc")
            .await
            .unwrap()
            .is_none());

        // Saving under the same record ID updates in place
        let mut updated = txn.clone();
        updated.status = TransactionStatus::Paid;
        store.save_transaction(&updated).await.unwrap();
        assert_eq!(store.get_all_transactions().len(), 1);
        assert_eq!(
            store
                .find_transaction("inv_1", "ext_abc")
                .await
                .unwrap()
                .unwrap()
                .status,
            TransactionStatus::Paid
        );
    }
}
