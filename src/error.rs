//! Error types for billing operations.
//!
//! A single crate-wide error enum keeps the propagation policy explicit:
//! not-found and validation errors abort before any mutation, provider
//! errors leave local state untouched and are safe to retry, and
//! notification errors never fail the operation that triggered them.

/// The main error type for billing operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// A referenced customer, product, subscription or invoice does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation (malformed date, non-positive amount, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The payment provider call failed or returned an unrecognized shape.
    #[error("Provider error during '{operation}': {message}")]
    Provider { operation: String, message: String },

    /// The payment provider call did not complete within the configured deadline.
    #[error("Provider call '{operation}' timed out")]
    ProviderTimeout { operation: String },

    /// Notification dispatch failed. Never fatal to the triggering operation.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// The record store reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An invalid state transition was requested.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BillingError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn provider_timeout(operation: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            operation: operation.into(),
        }
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error was caused by bad caller input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Validation(_) | Self::InvalidTransition(_)
        )
    }

    /// Check if the failed operation is safe to retry.
    ///
    /// Provider failures leave local state untouched ("check failed, state
    /// unknown"), and notification failures are retried by the next
    /// scheduler pass, so both are retryable. Validation and not-found
    /// errors will fail identically on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::ProviderTimeout { .. }
                | Self::Notification(_)
                | Self::Storage(_)
        )
    }
}

/// Result type alias for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;
