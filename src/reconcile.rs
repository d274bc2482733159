//! Payment reconciliation.
//!
//! Pulls authoritative payment state from the provider and applies it to
//! the local invoice and transaction records. Safe to call repeatedly and
//! concurrently for the same invoice: the transaction write is an upsert
//! keyed by `(invoice_id, transaction_id)`, never a blind append.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{BillingError, Result};
use crate::provider::PaymentProvider;
use crate::storage::{
    BillingStore, Invoice, InvoiceStatus, PaymentMethod, PaymentTransaction, TransactionStatus,
};

/// Result of a reconciliation check.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum ReconcileOutcome {
    /// The invoice had already left `Pending`; nothing was pulled.
    AlreadySettled {
        /// The invoice status found locally.
        status: InvoiceStatus,
    },
    /// The provider state maps to no transition; the invoice is untouched.
    Unchanged {
        /// The provider state observed.
        provider_state: String,
    },
    /// The invoice transitioned and its transaction record was upserted.
    Updated {
        invoice: Invoice,
        transaction: PaymentTransaction,
    },
}

/// Map a provider state string to the invoice status it implies.
///
/// The table is fixed: `COMPLETED` settles, `CANCELLED`/`FAILED` cancels,
/// anything else is an explicit non-transition.
fn map_provider_state(state: &str) -> Option<InvoiceStatus> {
    match state {
        "COMPLETED" => Some(InvoiceStatus::Paid),
        "CANCELLED" | "FAILED" => Some(InvoiceStatus::Cancelled),
        _ => None,
    }
}

/// Reconciles pending invoices against the payment provider.
pub struct PaymentReconciler<S, P> {
    store: S,
    provider: P,
    config: CoreConfig,
}

impl<S, P> PaymentReconciler<S, P>
where
    S: BillingStore,
    P: PaymentProvider,
{
    /// Create a new reconciler with default configuration.
    #[must_use]
    pub fn new(store: S, provider: P) -> Self {
        Self::with_config(store, provider, CoreConfig::default())
    }

    /// Create a new reconciler with custom configuration.
    #[must_use]
    pub fn with_config(store: S, provider: P, config: CoreConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Pull provider state for a pending invoice and apply it locally.
    ///
    /// A provider failure leaves the invoice untouched and surfaces as a
    /// retryable error: the check failed, the state is unknown. A
    /// provider state outside the mapping table is a success with
    /// [`ReconcileOutcome::Unchanged`], distinct from an error.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown invoice, a validation error for a
    /// manual invoice or one without an external payment ID, and provider
    /// errors when the status poll fails.
    pub async fn reconcile(&self, invoice_id: &str) -> Result<ReconcileOutcome> {
        let mut invoice = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
            BillingError::not_found(format!("Invoice not found: {}", invoice_id))
        })?;

        if !invoice.payment_method.is_provider_based() {
            return Err(BillingError::validation(format!(
                "Invoice {} is settled manually; use mark_paid_manually",
                invoice_id
            )));
        }
        let payment_id = invoice.external_payment_id.clone().ok_or_else(|| {
            BillingError::validation(format!(
                "Invoice {} has no external payment id to reconcile against",
                invoice_id
            ))
        })?;

        if invoice.status != InvoiceStatus::Pending {
            return Ok(ReconcileOutcome::AlreadySettled {
                status: invoice.status,
            });
        }

        let poll = self.provider.get_payment_status(&payment_id);
        let state = match tokio::time::timeout(self.config.provider_timeout, poll).await {
            Ok(result) => result?,
            Err(_) => return Err(BillingError::provider_timeout("get_payment_status")),
        };

        let Some(target) = map_provider_state(&state.state) else {
            tracing::debug!(
                target: "subcurrent::reconcile",
                invoice_id = %invoice_id,
                provider_state = %state.state,
                "provider state maps to no transition"
            );
            return Ok(ReconcileOutcome::Unchanged {
                provider_state: state.state,
            });
        };

        if target == invoice.status {
            return Ok(ReconcileOutcome::Unchanged {
                provider_state: state.state,
            });
        }

        invoice.status = target;
        self.store.save_invoice(&invoice).await?;

        let transaction_status = match target {
            InvoiceStatus::Paid => TransactionStatus::Paid,
            _ => TransactionStatus::Failed,
        };

        // Upsert keyed by the external reference so retried or concurrent
        // checks converge on a single row.
        let transaction = match self.store.find_transaction(&invoice.id, &payment_id).await? {
            Some(mut existing) => {
                existing.status = transaction_status;
                existing.provider_response = state.payload.clone();
                existing.transaction_date = Utc::now();
                existing
            }
            None => PaymentTransaction {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice.id.clone(),
                customer_id: invoice.customer_id.clone(),
                payment_method: invoice.payment_method,
                amount: invoice.amount,
                currency: invoice.currency.clone(),
                status: transaction_status,
                transaction_id: payment_id.clone(),
                provider_response: state.payload.clone(),
                transaction_date: Utc::now(),
            },
        };
        self.store.save_transaction(&transaction).await?;

        tracing::info!(
            target: "subcurrent::reconcile",
            invoice_id = %invoice.id,
            provider_state = %state.state,
            status = %invoice.status,
            "invoice reconciled"
        );

        Ok(ReconcileOutcome::Updated {
            invoice,
            transaction,
        })
    }

    /// Mark a manual invoice as paid.
    ///
    /// Only valid for a `Manual` invoice still in `Pending`. Records a
    /// transaction with a locally generated reference.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown invoice and a validation error
    /// when the invoice is provider-settled or no longer pending.
    pub async fn mark_paid_manually(
        &self,
        invoice_id: &str,
    ) -> Result<(Invoice, PaymentTransaction)> {
        let mut invoice = self.store.get_invoice(invoice_id).await?.ok_or_else(|| {
            BillingError::not_found(format!("Invoice not found: {}", invoice_id))
        })?;

        if invoice.payment_method != PaymentMethod::Manual {
            return Err(BillingError::validation(format!(
                "Invoice {} is provider-settled; reconcile it instead",
                invoice_id
            )));
        }
        if invoice.status != InvoiceStatus::Pending {
            return Err(BillingError::validation(format!(
                "Invoice {} is {}, not pending",
                invoice_id, invoice.status
            )));
        }

        invoice.status = InvoiceStatus::Paid;
        self.store.save_invoice(&invoice).await?;

        let transaction = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice.id.clone(),
            customer_id: invoice.customer_id.clone(),
            payment_method: PaymentMethod::Manual,
            amount: invoice.amount,
            currency: invoice.currency.clone(),
            status: TransactionStatus::Paid,
            transaction_id: format!("manual_{}", Uuid::new_v4()),
            provider_response: json!({ "manual": true }),
            transaction_date: Utc::now(),
        };
        self.store.save_transaction(&transaction).await?;

        tracing::info!(
            target: "subcurrent::reconcile",
            invoice_id = %invoice.id,
            "invoice marked paid manually"
        );

        Ok((invoice, transaction))
    }
}
