//! Monetary helpers - rounding, bank amount formatting, and currency snapshots.
//!
//! Amounts are `f64` throughout the ledger and are rounded to two decimals whenever they are
//! stored or compared against a bank-reported figure.

use crate::{config::CurrencyConfig, entities::Currency};

/// Tolerance when comparing two rounded amounts.
pub const AMOUNT_EPSILON: f64 = 0.005;

/// Rounds to two decimals, half away from zero.
#[must_use]
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Whether two amounts are equal once rounded to cents.
#[must_use]
pub fn same_amount(a: f64, b: f64) -> bool {
    (round2(a) - round2(b)).abs() < AMOUNT_EPSILON
}

/// Formats an amount the way the bank expects it in signed fields (e.g., `"1200.00"`).
#[must_use]
pub fn format_bank_amount(amount: f64) -> String {
    format!("{:.2}", round2(amount))
}

impl Currency {
    /// ISO 4217 numeric code sent to the bank.
    #[must_use]
    pub const fn iso_numeric(self) -> &'static str {
        match self {
            Self::Try => "949",
            Self::Usd => "840",
            Self::Eur => "978",
        }
    }

    /// ISO 4217 alphabetic code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Try => "TRY",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }

    /// Lira per unit of this currency according to the configured snapshot.
    #[must_use]
    pub const fn exchange_rate(self, rates: &CurrencyConfig) -> f64 {
        match self {
            Self::Try => 1.0,
            Self::Usd => rates.usd_rate,
            Self::Eur => rates.eur_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1200.0), 1200.0);
        assert_eq!(round2(10.005_000_1), 10.01);
        assert_eq!(round2(-2.345_1), -2.35);
        assert_eq!(round2(1080.000_000_000_1), 1080.0);
    }

    #[test]
    fn test_same_amount() {
        assert!(same_amount(1200.0, 1200.001));
        assert!(!same_amount(1200.0, 1200.01));
    }

    #[test]
    fn test_format_bank_amount() {
        assert_eq!(format_bank_amount(1200.0), "1200.00");
        assert_eq!(format_bank_amount(99.5), "99.50");
        assert_eq!(format_bank_amount(0.1 + 0.2), "0.30");
    }

    #[test]
    fn test_exchange_rate_snapshot() {
        let rates = CurrencyConfig {
            usd_rate: 32.0,
            eur_rate: 35.0,
        };
        assert_eq!(Currency::Try.exchange_rate(&rates), 1.0);
        assert_eq!(Currency::Usd.exchange_rate(&rates), 32.0);
        assert_eq!(Currency::Eur.exchange_rate(&rates), 35.0);
        assert_eq!(Currency::Usd.iso_numeric(), "840");
    }
}
