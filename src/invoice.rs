//! Invoice generation.
//!
//! Creates an [`Invoice`] for a given payment method, obtaining a hosted
//! payment link or recurring agreement from the payment provider for
//! provider-based methods. The provider call is atomic with respect to
//! invoice creation: if the provider refuses, no invoice is written.
//! Notification dispatch after creation is fire-and-forget.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{BillingError, Result};
use crate::notify::{Notification, NotificationTrigger, Notifier};
use crate::provider::{CreatePaymentRequest, PaymentProvider};
use crate::storage::{BillingStore, Catalog, Invoice, InvoiceStatus, PaymentMethod};

/// Request to generate an invoice.
#[derive(Debug, Clone)]
pub struct GenerateInvoiceRequest {
    /// Billed customer; must resolve through the catalog.
    pub customer_id: String,
    /// Amount owed. Must be positive.
    pub amount: f64,
    /// Currency of `amount`.
    pub currency: String,
    /// When payment is due.
    pub due_date: NaiveDate,
    /// How the invoice gets settled.
    pub payment_method: PaymentMethod,
    /// Originating subscription, recorded in metadata when present.
    pub subscription_id: Option<String>,
    /// Additional opaque context merged into the invoice metadata.
    pub metadata: serde_json::Value,
}

/// Result of invoice generation.
#[derive(Debug, Clone)]
#[must_use]
pub struct GeneratedInvoice {
    /// The persisted invoice.
    pub invoice: Invoice,
    /// Hosted payment link, for provider-based methods.
    pub payment_link: Option<String>,
    /// Recurring agreement ID, for the recurring-debit method.
    pub agreement_id: Option<String>,
    /// Set when the payment-link notification failed. Never fatal.
    pub notification_error: Option<String>,
}

/// Generates invoices, branching on payment method.
pub struct InvoiceGenerator<S, C, P, N> {
    store: S,
    catalog: C,
    provider: P,
    notifier: N,
    config: CoreConfig,
}

impl<S: Clone, C: Clone, P: Clone, N: Clone> Clone for InvoiceGenerator<S, C, P, N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            provider: self.provider.clone(),
            notifier: self.notifier.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, C, P, N> InvoiceGenerator<S, C, P, N>
where
    S: BillingStore,
    C: Catalog,
    P: PaymentProvider,
    N: Notifier,
{
    /// Create a new invoice generator with default configuration.
    #[must_use]
    pub fn new(store: S, catalog: C, provider: P, notifier: N) -> Self {
        Self::with_config(store, catalog, provider, notifier, CoreConfig::default())
    }

    /// Create a new invoice generator with custom configuration.
    #[must_use]
    pub fn with_config(store: S, catalog: C, provider: P, notifier: N, config: CoreConfig) -> Self {
        Self {
            store,
            catalog,
            provider,
            notifier,
            config,
        }
    }

    /// Generate and persist an invoice.
    ///
    /// For provider-based methods the provider is asked for a payment
    /// request first; a provider failure aborts with no invoice created.
    /// For the recurring-debit method a payment-link notification goes out
    /// after the invoice is saved; its failure is reported in the result
    /// but does not roll anything back.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-positive amounts, not-found for
    /// an unknown customer, and provider errors when the payment request
    /// cannot be created.
    pub async fn generate(&self, request: GenerateInvoiceRequest) -> Result<GeneratedInvoice> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(BillingError::validation(format!(
                "Invoice amount must be positive, got {}",
                request.amount
            )));
        }

        let customer = self
            .catalog
            .get_customer(&request.customer_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(format!("Customer not found: {}", request.customer_id))
            })?;

        let handle = if request.payment_method.is_provider_based() {
            let payment_request = CreatePaymentRequest {
                amount: request.amount,
                currency: request.currency.clone(),
                customer_id: customer.id.clone(),
                description: describe(&request),
            };
            let call = self.provider.create_payment_request(payment_request);
            let handle = match tokio::time::timeout(self.config.provider_timeout, call).await {
                Ok(result) => result?,
                Err(_) => return Err(BillingError::provider_timeout("create_payment_request")),
            };
            Some(handle)
        } else {
            None
        };

        let mut metadata = request.metadata.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        if let Some(subscription_id) = &request.subscription_id {
            metadata["subscription_id"] = json!(subscription_id);
        }

        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            status: InvoiceStatus::Pending,
            payment_method: request.payment_method,
            external_payment_id: handle.as_ref().map(|h| h.id.clone()),
            payment_link: handle.as_ref().and_then(|h| h.link.clone()),
            due_date: request.due_date,
            issued_date: Utc::now().date_naive(),
            metadata,
        };
        self.store.save_invoice(&invoice).await?;

        tracing::info!(
            target: "subcurrent::invoice",
            invoice_id = %invoice.id,
            customer_id = %invoice.customer_id,
            payment_method = %invoice.payment_method,
            amount = invoice.amount,
            "invoice generated"
        );

        // Recurring agreements carry the payment link to the customer by
        // mail; a refused dispatch must not undo the invoice.
        let mut notification_error = None;
        if request.payment_method == PaymentMethod::ProviderRecurring {
            if let Some(link) = &invoice.payment_link {
                let notification = Notification::new(
                    customer.email.clone(),
                    NotificationTrigger::InvoicePaymentLink,
                    json!({
                        "customer_name": customer.name,
                        "amount": invoice.amount,
                        "currency": invoice.currency,
                        "payment_link": link,
                        "due_date": invoice.due_date.to_string(),
                    }),
                );
                let send = self.notifier.send(&notification);
                let outcome = match tokio::time::timeout(self.config.notify_timeout, send).await {
                    Ok(result) => result,
                    Err(_) => Err(BillingError::notification("payment link dispatch timed out")),
                };
                if let Err(err) = outcome {
                    tracing::warn!(
                        target: "subcurrent::invoice",
                        invoice_id = %invoice.id,
                        error = %err,
                        "payment link notification failed"
                    );
                    notification_error = Some(err.to_string());
                }
            }
        }

        let agreement_id = if request.payment_method == PaymentMethod::ProviderRecurring {
            handle.as_ref().map(|h| h.id.clone())
        } else {
            None
        };

        Ok(GeneratedInvoice {
            payment_link: invoice.payment_link.clone(),
            agreement_id,
            notification_error,
            invoice,
        })
    }
}

fn describe(request: &GenerateInvoiceRequest) -> String {
    match &request.subscription_id {
        Some(id) => format!("Subscription {} renewal", id),
        None => format!("Invoice for customer {}", request.customer_id),
    }
}
