//! Currency conversion against a base-currency rate table.
//!
//! Conversion is best-effort by design: a missing table, an unknown
//! currency code, or a zero rate returns the amount unchanged rather than
//! failing. Display amounts must never take down a billing operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rate table keyed by currency code, relative to a base currency.
///
/// Supplied by an external rate feed; read-only to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRates {
    /// The base currency every rate is expressed against.
    pub base: String,
    /// Units of the keyed currency per one unit of base.
    pub rates: HashMap<String, f64>,
    /// When the table was fetched.
    pub last_updated: DateTime<Utc>,
    /// True when the feed failed and these are stale fallback rates.
    pub is_fallback: bool,
}

impl ExchangeRates {
    /// Create a rate table with the given base currency.
    #[must_use]
    pub fn new(base: impl Into<String>, rates: HashMap<String, f64>, last_updated: DateTime<Utc>) -> Self {
        Self {
            base: base.into(),
            rates,
            last_updated,
            is_fallback: false,
        }
    }

    /// Mark the table as stale fallback data.
    #[must_use]
    pub fn as_fallback(mut self) -> Self {
        self.is_fallback = true;
        self
    }

    fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied().filter(|r| *r > 0.0)
    }

    /// Convert `amount` from one currency to another via this table.
    ///
    /// Same-currency conversions and lookups with missing or unusable rate
    /// entries return `amount` unchanged. Cross conversions between two
    /// non-base currencies go through the base.
    #[must_use]
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        if from == to {
            return amount;
        }
        if from == self.base {
            return match self.rate(to) {
                Some(rate) => amount * rate,
                None => amount,
            };
        }
        if to == self.base {
            return match self.rate(from) {
                Some(rate) => amount / rate,
                None => amount,
            };
        }
        // from -> base -> to
        match (self.rate(from), self.rate(to)) {
            (Some(from_rate), Some(to_rate)) => amount / from_rate * to_rate,
            _ => amount,
        }
    }
}

/// Convert `amount` between currencies, tolerating an absent rate table.
#[must_use]
pub fn convert(amount: f64, from: &str, to: &str, rates: Option<&ExchangeRates>) -> f64 {
    match rates {
        Some(rates) => rates.convert(amount, from, to),
        None => amount,
    }
}

/// Format an amount for display (e.g. "99.00 DKK").
#[must_use]
pub fn format_amount(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}
