//! Renewal reminder evaluation.
//!
//! [`evaluate`] is pure: given a subscription and a point in time it
//! decides which reminder, if any, is due. Dispatch and flag bookkeeping
//! live in the scheduler; keeping the decision side-effect free makes the
//! threshold rules independently testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::Subscription;

/// Which reminder a subscription is due for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// 10-day threshold crossed, reminder not yet sent.
    TenDay,
    /// 5-day threshold crossed, reminder not yet sent.
    FiveDay,
    /// The term has already ended. Reported, but not a reminder to send.
    Expired,
    /// Nothing due.
    NotNeeded,
}

impl ReminderKind {
    /// Convert to the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenDay => "10_day",
            Self::FiveDay => "5_day",
            Self::Expired => "expired",
            Self::NotNeeded => "none",
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a reminder evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct ReminderEvaluation {
    /// Whole calendar days until the term ends. Zero or negative once ended.
    pub days_left: i64,
    /// Whether a reminder should be dispatched now.
    pub needs_reminder: bool,
    /// Which threshold applies.
    pub kind: ReminderKind,
    /// Whether the situation warrants urgent presentation.
    pub is_urgent: bool,
}

/// Evaluate reminder eligibility for a subscription at `now`.
///
/// Day counts use calendar-day granularity: the difference between the
/// end date and today's date, independent of time of day. Rules in
/// priority order:
///
/// 1. Already ended -> `Expired`, urgent, no reminder (expiry handling is
///    a lifecycle concern, not a reminder).
/// 2. Five or fewer days left, 5-day flag unsent -> `FiveDay`, urgent.
///    Wins over the 10-day window even when both are open.
/// 3. Six to ten days left, 10-day flag unsent -> `TenDay`.
/// 4. Otherwise nothing is due.
pub fn evaluate(subscription: &Subscription, now: DateTime<Utc>) -> ReminderEvaluation {
    let days_left = (subscription.end_date - now.date_naive()).num_days();

    if days_left <= 0 {
        return ReminderEvaluation {
            days_left,
            needs_reminder: false,
            kind: ReminderKind::Expired,
            is_urgent: true,
        };
    }

    if days_left <= 5 && !subscription.reminder_5_sent {
        return ReminderEvaluation {
            days_left,
            needs_reminder: true,
            kind: ReminderKind::FiveDay,
            is_urgent: true,
        };
    }

    if days_left <= 10 && !subscription.reminder_10_sent {
        return ReminderEvaluation {
            days_left,
            needs_reminder: true,
            kind: ReminderKind::TenDay,
            is_urgent: false,
        };
    }

    ReminderEvaluation {
        days_left,
        needs_reminder: false,
        kind: ReminderKind::NotNeeded,
        is_urgent: false,
    }
}
