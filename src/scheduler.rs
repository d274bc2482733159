//! Renewal reminder scheduling.
//!
//! Walks active subscriptions, evaluates reminder eligibility, dispatches
//! notifications, and flips the sent-flags only after confirmed dispatch.
//! A failed dispatch leaves the flag untouched so the next pass retries;
//! that retry loop is the only retry mechanism. The same pass moves
//! subscriptions whose term has ended from `Active` to `Expired`.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::CoreConfig;
use crate::error::{BillingError, Result};
use crate::notify::{Notification, NotificationTrigger, Notifier};
use crate::reminder::{evaluate, ReminderKind};
use crate::storage::{BillingStore, Catalog, Subscription, SubscriptionStatus};

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct SchedulerReport {
    /// Active subscriptions evaluated.
    pub evaluated: usize,
    /// Reminders dispatched and flagged.
    pub reminders_sent: usize,
    /// Dispatch attempts that failed; retried on the next pass.
    pub dispatch_failures: usize,
    /// Subscriptions moved from `Active` to `Expired`.
    pub expired: usize,
}

/// Periodic reminder scheduler.
pub struct ReminderScheduler<S, C, N> {
    store: S,
    catalog: C,
    notifier: N,
    config: CoreConfig,
}

impl<S, C, N> ReminderScheduler<S, C, N>
where
    S: BillingStore,
    C: Catalog,
    N: Notifier,
{
    /// Create a new scheduler with default configuration.
    #[must_use]
    pub fn new(store: S, catalog: C, notifier: N) -> Self {
        Self::with_config(store, catalog, notifier, CoreConfig::default())
    }

    /// Create a new scheduler with custom configuration.
    #[must_use]
    pub fn with_config(store: S, catalog: C, notifier: N, config: CoreConfig) -> Self {
        Self {
            store,
            catalog,
            notifier,
            config,
        }
    }

    /// Run one pass over all active subscriptions.
    ///
    /// Subscriptions are independent; a failure on one is logged and the
    /// pass continues. Dispatch failures are counted, never propagated.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<SchedulerReport> {
        let subscriptions = self.store.list_active_subscriptions().await?;
        let mut report = SchedulerReport::default();

        for subscription in subscriptions {
            report.evaluated += 1;
            let evaluation = evaluate(&subscription, now);

            match evaluation.kind {
                ReminderKind::Expired => {
                    if let Err(err) = self.expire(&subscription).await {
                        tracing::error!(
                            target: "subcurrent::scheduler",
                            subscription_id = %subscription.id,
                            error = %err,
                            "failed to expire subscription"
                        );
                    } else {
                        report.expired += 1;
                    }
                }
                ReminderKind::TenDay | ReminderKind::FiveDay if evaluation.needs_reminder => {
                    match self
                        .dispatch_reminder(&subscription, evaluation.kind, evaluation.days_left)
                        .await
                    {
                        Ok(()) => report.reminders_sent += 1,
                        Err(err) => {
                            // Flag stays false; the next pass retries.
                            tracing::warn!(
                                target: "subcurrent::scheduler",
                                subscription_id = %subscription.id,
                                kind = %evaluation.kind,
                                error = %err,
                                "reminder dispatch failed; will retry next pass"
                            );
                            report.dispatch_failures += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        tracing::info!(
            target: "subcurrent::scheduler",
            evaluated = report.evaluated,
            reminders_sent = report.reminders_sent,
            dispatch_failures = report.dispatch_failures,
            expired = report.expired,
            "reminder pass finished"
        );

        Ok(report)
    }

    async fn expire(&self, subscription: &Subscription) -> Result<()> {
        let mut expired = subscription.clone();
        expired.status = SubscriptionStatus::Expired;
        self.store.save_subscription(&expired).await?;
        tracing::info!(
            target: "subcurrent::scheduler",
            subscription_id = %subscription.id,
            end_date = %subscription.end_date,
            "subscription expired"
        );
        Ok(())
    }

    /// Dispatch one reminder, then flip the matching flag.
    ///
    /// The flag write happens strictly after confirmed dispatch. The
    /// failure mode that remains is a crash between dispatch and flag
    /// write, which re-sends on the next pass: at-least-once is
    /// acceptable, a flag without a dispatch is not.
    async fn dispatch_reminder(
        &self,
        subscription: &Subscription,
        kind: ReminderKind,
        days_left: i64,
    ) -> Result<()> {
        let customer = self
            .catalog
            .get_customer(&subscription.customer_id)
            .await?
            .ok_or_else(|| {
                BillingError::not_found(format!(
                    "Customer not found: {}",
                    subscription.customer_id
                ))
            })?;

        let trigger = match kind {
            ReminderKind::TenDay => NotificationTrigger::Subscription10DayReminder,
            ReminderKind::FiveDay => NotificationTrigger::Subscription5DayReminder,
            _ => {
                return Err(BillingError::internal(format!(
                    "no reminder template for kind '{}'",
                    kind
                )))
            }
        };

        let notification = Notification::new(
            customer.email,
            trigger,
            serde_json::json!({
                "customer_name": customer.name,
                "product_name": subscription.product_name,
                "days_left": days_left,
                "end_date": subscription.end_date.to_string(),
            }),
        );

        let send = self.notifier.send(&notification);
        match tokio::time::timeout(self.config.notify_timeout, send).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BillingError::notification(format!(
                    "reminder dispatch for {} timed out",
                    subscription.id
                )))
            }
        }

        let mut flagged = subscription.clone();
        match kind {
            ReminderKind::TenDay => flagged.reminder_10_sent = true,
            ReminderKind::FiveDay => flagged.reminder_5_sent = true,
            _ => unreachable!("guarded above"),
        }
        self.store.save_subscription(&flagged).await?;

        tracing::info!(
            target: "subcurrent::scheduler",
            subscription_id = %subscription.id,
            kind = %kind,
            days_left,
            "reminder dispatched"
        );
        Ok(())
    }

    /// Spawn the periodic scheduler loop.
    ///
    /// Runs a pass every `scheduler_interval` until a shutdown signal
    /// arrives. Pass failures are logged and the loop continues.
    pub fn spawn(self, mut shutdown_rx: mpsc::Receiver<()>) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
        C: 'static,
        N: 'static,
    {
        tokio::spawn(async move {
            tracing::info!(
                target: "subcurrent::scheduler",
                interval_secs = self.config.scheduler_interval.as_secs(),
                "reminder scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    _ = sleep(self.config.scheduler_interval) => {
                        if let Err(err) = self.run_pass(Utc::now()).await {
                            tracing::error!(
                                target: "subcurrent::scheduler",
                                error = %err,
                                "reminder pass failed"
                            );
                        }
                    }
                }
            }

            tracing::info!(target: "subcurrent::scheduler", "reminder scheduler stopped");
        })
    }
}
