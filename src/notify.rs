//! Notification port.
//!
//! Outbound messages are templated: the core hands a trigger name and a
//! data payload to the backend, which owns rendering and delivery. A
//! console backend is provided for development and a recording mock for
//! tests.

use crate::error::Result;
use async_trait::async_trait;

/// Template trigger names understood by the notification backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTrigger {
    /// Renewal reminder, 10 days before expiry.
    Subscription10DayReminder,
    /// Renewal reminder, 5 days before expiry.
    Subscription5DayReminder,
    /// Payment link for a freshly generated invoice.
    InvoicePaymentLink,
}

impl NotificationTrigger {
    /// Convert to the template key the backend dispatches on.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription10DayReminder => "subscription_10_day_reminder",
            Self::Subscription5DayReminder => "subscription_5_day_reminder",
            Self::InvoicePaymentLink => "invoice_payment_link",
        }
    }
}

impl std::fmt::Display for NotificationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A templated notification to be dispatched.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    /// Template to render.
    pub trigger: NotificationTrigger,
    /// Template data (product name, days left, payment link, ...).
    pub data: serde_json::Value,
}

impl Notification {
    /// Create a new notification.
    #[must_use]
    pub fn new(to: impl Into<String>, trigger: NotificationTrigger, data: serde_json::Value) -> Self {
        Self {
            to: to.into(),
            trigger,
            data,
        }
    }

    /// Validate the notification has a recipient.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(crate::error::BillingError::validation(
                "Notification 'to' is required",
            ));
        }
        Ok(())
    }
}

/// Trait for dispatching notifications.
///
/// Implement this trait over your email/SMS backend. Dispatch failures
/// must be reported through the returned error; the caller decides whether
/// they are fatal (they never are for reminder dispatch).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch a notification. Returns only after delivery is confirmed
    /// or refused by the backend.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// A notifier that logs instead of sending.
///
/// Useful for development when you want to see what would be dispatched
/// without a delivery backend. Template data is logged verbatim; keep it
/// free of secrets.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Create a new console notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        notification.validate()?;
        tracing::info!(
            target: "subcurrent::notify",
            to = %notification.to,
            trigger = %notification.trigger,
            data = %notification.data,
            "notification dispatched (console backend)"
        );
        Ok(())
    }
}

/// Recording mock notifier for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use crate::error::BillingError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, RwLock};

    /// Mock notifier that records every dispatch.
    #[derive(Default, Clone)]
    pub struct MockNotifier {
        inner: Arc<MockNotifierInner>,
    }

    #[derive(Default)]
    struct MockNotifierInner {
        sent: RwLock<Vec<Notification>>,
        fail: AtomicBool,
    }

    impl MockNotifier {
        /// Create a new mock notifier.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `send` fail until reset.
        pub fn fail(&self, fail: bool) {
            self.inner.fail.store(fail, Ordering::SeqCst);
        }

        /// All notifications dispatched so far.
        pub fn sent(&self) -> Vec<Notification> {
            self.inner.sent.read().unwrap().clone()
        }

        /// Dispatches recorded for a given trigger.
        pub fn sent_for(&self, trigger: NotificationTrigger) -> Vec<Notification> {
            self.inner
                .sent
                .read()
                .unwrap()
                .iter()
                .filter(|n| n.trigger == trigger)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, notification: &Notification) -> Result<()> {
            notification.validate()?;
            if self.inner.fail.load(Ordering::SeqCst) {
                return Err(BillingError::notification("mock backend refused dispatch"));
            }
            self.inner.sent.write().unwrap().push(notification.clone());
            Ok(())
        }
    }
}
