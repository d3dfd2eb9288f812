//! Fee calculator
//!
//! Pure arithmetic over an injected [`FeeSchedule`]. Amounts are integer
//! cents ([`Money`]); percentages stay [`Decimal`] so a configured `0.25`
//! is exactly a quarter percent. Each percentage result is rounded to the
//! cent half-away-from-zero, and `net` is the exact difference of the
//! rounded fees, so the split always adds up.

use std::fmt;
use std::ops::{Add, Sub};

use rust_decimal::prelude::*;
use serde::{Serialize, Serializer};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Amount in minor units (cents)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Round a decimal amount to the cent. `None` if it does not fit.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        (value * HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money)
    }

    /// Convert a finite float amount (request bodies, env values)
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).and_then(Self::from_decimal)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `self * pct / 100`, rounded half-away-from-zero
    pub fn percent(self, pct: Decimal) -> Money {
        let raw = Decimal::from(self.0) * pct / HUNDRED;
        // |result| <= |self| for pct in [0, 100], so the conversion fits
        Money(
            raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or_default(),
        )
    }

    pub fn clamp_non_negative(self) -> Money {
        Money(self.0.max(0))
    }

    pub fn saturating_mul(self, n: i64) -> Money {
        Money(self.0.saturating_mul(n))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

/// Serialized as a decimal number (`53.99`) for display
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

/// Immutable fee configuration, built once from [`crate::config::Config`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub base_fee: Money,
    pub per_condo_fee: Money,
    pub platform_fee_percent: Decimal,
    pub processor_fee_percent: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: Money::from_cents(2999),
            per_condo_fee: Money::from_cents(800),
            platform_fee_percent: Decimal::new(100, 2),
            processor_fee_percent: Decimal::new(25, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriptionPricing {
    pub base: Money,
    pub per_condo: Money,
    pub condo_count: i64,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlatformFees {
    pub amount: Money,
    pub platform_fee_percent: Decimal,
    pub platform_fee: Money,
    pub processor_fee_percent: Decimal,
    pub processor_fee: Money,
    /// Platform fee minus processor fee; negative when the processor costs more
    pub net: Money,
}

impl FeeSchedule {
    /// Monthly total for an administrator. Negative counts price as zero.
    pub fn calculate_subscription_total(&self, condo_count: i64) -> SubscriptionPricing {
        let condo_count = condo_count.max(0);
        let total = self.base_fee + self.per_condo_fee.saturating_mul(condo_count);
        SubscriptionPricing {
            base: self.base_fee,
            per_condo: self.per_condo_fee,
            condo_count,
            total: total.clamp_non_negative(),
        }
    }

    /// Split a gross marketplace amount. Negative amounts price as zero.
    pub fn calculate_platform_fees(&self, amount: Money) -> PlatformFees {
        let amount = amount.clamp_non_negative();
        let platform_fee = amount.percent(self.platform_fee_percent);
        let processor_fee = amount.percent(self.processor_fee_percent);
        PlatformFees {
            amount,
            platform_fee_percent: self.platform_fee_percent,
            platform_fee,
            processor_fee_percent: self.processor_fee_percent,
            processor_fee,
            net: platform_fee - processor_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_subscription_total_three_condos() {
        let pricing = FeeSchedule::default().calculate_subscription_total(3);
        assert_eq!(pricing.total, Money::from_cents(5399));
        assert_eq!(pricing.condo_count, 3);
        assert_eq!(pricing.base, Money::from_cents(2999));
    }

    #[test]
    fn test_subscription_total_clamps_negative_count() {
        let schedule = FeeSchedule::default();
        assert_eq!(
            schedule.calculate_subscription_total(-5),
            schedule.calculate_subscription_total(0)
        );
        assert_eq!(
            schedule.calculate_subscription_total(0).total,
            Money::from_cents(2999)
        );
    }

    #[test]
    fn test_subscription_total_formula_holds() {
        let schedule = FeeSchedule::default();
        for count in [0_i64, 1, 2, 17, 250, 10_000] {
            let p = schedule.calculate_subscription_total(count);
            assert_eq!(p.total.cents(), 2999 + 800 * count);
            assert!(!p.total.is_negative());
        }
    }

    #[test]
    fn test_platform_fees_round_trip_fixture() {
        let fees = FeeSchedule::default().calculate_platform_fees(Money::from_cents(100_000));
        assert_eq!(fees.platform_fee, Money::from_cents(1000));
        assert_eq!(fees.processor_fee, Money::from_cents(250));
        assert_eq!(fees.net, Money::from_cents(750));
    }

    #[test]
    fn test_platform_fees_zero_amount() {
        let fees = FeeSchedule::default().calculate_platform_fees(Money::ZERO);
        assert_eq!(fees.platform_fee, Money::ZERO);
        assert_eq!(fees.processor_fee, Money::ZERO);
        assert_eq!(fees.net, Money::ZERO);
    }

    #[test]
    fn test_platform_fees_negative_amount_clamped() {
        let fees = FeeSchedule::default().calculate_platform_fees(Money::from_cents(-5000));
        assert_eq!(fees.amount, Money::ZERO);
        assert_eq!(fees.net, Money::ZERO);
    }

    #[test]
    fn test_net_is_exact_difference_of_rounded_fees() {
        let schedule = FeeSchedule::default();
        for cents in [1_i64, 3, 99, 150, 1234, 99_999, 100_000_000] {
            let fees = schedule.calculate_platform_fees(Money::from_cents(cents));
            assert_eq!(fees.net, fees.platform_fee - fees.processor_fee);
        }
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        // 2.00 at 0.25% = 0.005 -> 0.01
        let fees = FeeSchedule::default().calculate_platform_fees(Money::from_cents(200));
        assert_eq!(fees.processor_fee, Money::from_cents(1));
        assert_eq!(fees.platform_fee, Money::from_cents(2));
    }

    #[test]
    fn test_net_can_be_negative() {
        let schedule = FeeSchedule {
            platform_fee_percent: dec("0.5"),
            processor_fee_percent: dec("2.9"),
            ..FeeSchedule::default()
        };
        let fees = schedule.calculate_platform_fees(Money::from_cents(10_000));
        assert_eq!(fees.platform_fee, Money::from_cents(50));
        assert_eq!(fees.processor_fee, Money::from_cents(290));
        assert_eq!(fees.net, Money::from_cents(-240));
    }

    #[test]
    fn test_money_from_f64() {
        assert_eq!(Money::from_f64(1000.0), Some(Money::from_cents(100_000)));
        assert_eq!(Money::from_f64(29.99), Some(Money::from_cents(2999)));
        assert_eq!(Money::from_f64(0.005), Some(Money::from_cents(1)));
        assert_eq!(Money::from_f64(f64::NAN), None);
        assert_eq!(Money::from_f64(f64::INFINITY), None);
    }

    #[test]
    fn test_money_serializes_as_decimal() {
        let json = serde_json::to_value(Money::from_cents(5399)).unwrap();
        assert_eq!(json, serde_json::json!(53.99));
        assert_eq!(Money::from_cents(750).to_string(), "7.50");
    }

    #[test]
    fn test_platform_fees_serialize_as_numbers() {
        let fees = FeeSchedule::default().calculate_platform_fees(Money::from_cents(10_000));
        let json = serde_json::to_value(fees).unwrap();
        assert_eq!(json["amount"], 100.0);
        assert_eq!(json["platform_fee"], 1.0);
        assert_eq!(json["processor_fee"], 0.25);
        assert_eq!(json["net"], 0.75);
        assert_eq!(json["platform_fee_percent"], 1.0);
    }
}
