//! Monetary amounts and rates.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new Money amount from a whole dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.0.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Multiplies by a quantity, clamping at the representable range.
    pub fn saturating_mul(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts `other`, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Clamps negative amounts to zero.
    pub fn non_negative(&self) -> Money {
        Money(self.0.max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A rate expressed in basis points (1/100 of a percent).
///
/// `Percent::from_basis_points(1000)` is 10%. Stored rates above 100% are
/// rejected when deserialized.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "u32", try_from = "u32")]
pub struct Percent(u32);

/// A rate above 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate of {0} basis points exceeds 100%")]
pub struct PercentOutOfRange(pub u32);

impl TryFrom<u32> for Percent {
    type Error = PercentOutOfRange;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        if bps > Self::FULL {
            return Err(PercentOutOfRange(bps));
        }
        Ok(Self(bps))
    }
}

impl From<Percent> for u32 {
    fn from(rate: Percent) -> Self {
        rate.0
    }
}

impl Percent {
    const FULL: u32 = 10_000;

    /// Creates a rate from whole percent points, capped at 100%.
    pub fn from_percent(percent: u32) -> Self {
        Self((percent.saturating_mul(100)).min(Self::FULL))
    }

    /// Creates a rate from basis points, capped at 100%.
    pub fn from_basis_points(bps: u32) -> Self {
        Self(bps.min(Self::FULL))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Applies the rate to an amount, rounding half away from zero to the cent.
    pub fn of(&self, amount: Money) -> Money {
        let scaled = i128::from(amount.cents()) * i128::from(self.0);
        let full = i128::from(Self::FULL);
        let half = full / 2;
        let rounded = if scaled >= 0 {
            (scaled + half) / full
        } else {
            (scaled - half) / full
        };
        Money::from_cents(rounded as i64)
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.checked_mul(3), Some(Money::from_cents(3000)));
        assert_eq!(a.checked_add(b), Some(Money::from_cents(1500)));
        assert_eq!(b.saturating_sub(a), Money::zero());
        assert_eq!(Money::from_cents(-3).non_negative(), Money::zero());
    }

    #[test]
    fn money_overflow_is_reported() {
        let big = Money::from_cents(3_000_000_000);
        assert_eq!(big.checked_mul(u32::MAX), None);
        assert_eq!(big.saturating_mul(u32::MAX), Money::from_cents(i64::MAX));
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn money_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(1000));
    }

    #[test]
    fn percent_of_amount() {
        let ten = Percent::from_percent(10);
        assert_eq!(ten.basis_points(), 1000);
        assert_eq!(ten.of(Money::from_dollars(100)), Money::from_dollars(10));
        assert_eq!(ten.of(Money::from_cents(5)), Money::from_cents(1));
        assert_eq!(ten.of(Money::from_cents(4)), Money::zero());
    }

    #[test]
    fn percent_is_capped_at_one_hundred() {
        assert_eq!(Percent::from_percent(250).basis_points(), 10_000);
        assert_eq!(Percent::from_basis_points(20_000).basis_points(), 10_000);
    }

    #[test]
    fn percent_deserialization_enforces_the_cap() {
        let rate: Percent = serde_json::from_str("825").unwrap();
        assert_eq!(rate.basis_points(), 825);
        assert_eq!(serde_json::to_string(&rate).unwrap(), "825");

        let err = serde_json::from_str::<Percent>("15000").unwrap_err();
        assert!(err.to_string().contains("exceeds 100%"));
    }

    #[test]
    fn percent_display() {
        assert_eq!(Percent::from_basis_points(825).to_string(), "8.25%");
    }
}
