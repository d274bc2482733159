//! Subcurrent - a subscription billing lifecycle core
//!
//! Subcurrent implements the subscription-to-invoice-to-payment lifecycle
//! for recurring services: creating subscriptions, generating invoices,
//! reconciling external payment-provider state into local records, and
//! firing time-based renewal reminders exactly once per threshold.
//!
//! Everything external is a port: persistence ([`BillingStore`],
//! [`Catalog`]), the payment provider ([`PaymentProvider`]) and the
//! notification backend ([`Notifier`]) are traits you implement over your
//! own infrastructure. In-memory and mock implementations ship behind the
//! `test-support` feature.
//!
//! # Features
//!
//! - **Lifecycle**: subscription creation with calendar-month expiry,
//!   partial edits, deletion, and an enforced status machine
//! - **Invoicing**: per-payment-method invoice generation with hosted
//!   payment links and recurring agreements
//! - **Reconciliation**: idempotent provider-state pulls with keyed
//!   transaction upserts, safe under retries and concurrent checks
//! - **Reminders**: pure threshold evaluation plus a scheduler that
//!   dispatches first and flags after, so failures retry on the next pass
//! - **Currency**: best-effort conversion against a base-currency rate table
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use subcurrent::{
//!     CreateSubscriptionRequest, InvoiceGenerator, PaymentMethod,
//!     PaymentReconciler, SubscriptionManager,
//! };
//!
//! subcurrent::init_tracing();
//!
//! let invoices = InvoiceGenerator::new(store.clone(), catalog.clone(), provider.clone(), mailer);
//! let subscriptions = SubscriptionManager::new(store.clone(), catalog, invoices);
//!
//! let created = subscriptions
//!     .create_subscription(CreateSubscriptionRequest {
//!         customer_id: "cus_1".into(),
//!         product_id: "prod_hosting".into(),
//!         start_date: "2024-01-01".into(),
//!         payment_method: PaymentMethod::ProviderRecurring,
//!     })
//!     .await?;
//!
//! // Later, pull provider state for the generated invoice.
//! let reconciler = PaymentReconciler::new(store, provider);
//! reconciler.reconcile(&created.invoice.invoice.id).await?;
//! ```

pub mod config;
pub mod currency;
mod error;
pub mod invoice;
pub mod notify;
pub mod provider;
pub mod reconcile;
pub mod reminder;
pub mod scheduler;
pub mod storage;
pub mod subscription;

// Re-exports for public API
pub use config::CoreConfig;
pub use currency::{convert, format_amount, ExchangeRates};
pub use error::{BillingError, Result};
pub use invoice::{GenerateInvoiceRequest, GeneratedInvoice, InvoiceGenerator};
pub use notify::{ConsoleNotifier, Notification, NotificationTrigger, Notifier};
pub use provider::{
    CreatePaymentRequest, PaymentProvider, PaymentRequestHandle, ProviderPaymentState,
};
pub use reconcile::{PaymentReconciler, ReconcileOutcome};
pub use reminder::{evaluate, ReminderEvaluation, ReminderKind};
pub use scheduler::{ReminderScheduler, SchedulerReport};
pub use storage::{
    BillingStore, Catalog, Customer, Invoice, InvoiceStatus, PaymentMethod, PaymentTransaction,
    Product, Subscription, SubscriptionStatus, TransactionStatus,
};
pub use subscription::{
    CreateSubscriptionRequest, SubscriptionCreation, SubscriptionManager, UpdateSubscription,
};

#[cfg(feature = "test-support")]
pub use notify::test::MockNotifier;
#[cfg(feature = "test-support")]
pub use provider::test::MockPaymentProvider;
#[cfg(feature = "test-support")]
pub use storage::test::InMemoryBillingStore;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, before the managers
/// start doing work.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "subcurrent=debug")
/// - `SUBCURRENT_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("SUBCURRENT_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
