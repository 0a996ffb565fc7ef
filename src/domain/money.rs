use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Currency precision: amounts are stored in whole cents.
pub const SCALE: u32 = 2;

/// Exclusive upper bound of a NUMERIC(10,2) column.
const MAX_ABS: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// An account balance with cent precision.
///
/// Balances may go negative: overdraft policy belongs to the callers of the
/// ledger, not to the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(Decimal);

/// A validated, signed, non-zero posting amount.
///
/// Positive amounts credit an account and negative amounts debit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_zero() {
            return Err(LedgerError::InvalidAmount("amount must not be zero".to_string()));
        }
        let cents = to_cents(value)?;
        check_range(cents, "amount")?;
        Ok(Self(cents))
    }

    /// Builds a debit of `value`, which must itself be positive.
    pub fn debit(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "debit of {value} must be positive"
            )));
        }
        Self::new(-value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_credit(&self) -> bool {
        self.0.is_sign_positive()
    }

    pub fn is_debit(&self) -> bool {
        self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Decimal {
        self.0.abs()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Neg for Amount {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, SCALE));

    /// Wraps a value already known to fit cent precision, e.g. one read back from storage.
    pub fn new(value: Decimal) -> Self {
        let mut value = value;
        value.rescale(SCALE);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn covers(&self, required: Decimal) -> bool {
        self.0 >= required
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Add<Amount> for Balance {
    type Output = Self;
    fn add(self, rhs: Amount) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign<Amount> for Balance {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl SubAssign<Amount> for Balance {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rescales `value` to exactly two fractional digits, rejecting anything finer.
pub fn to_cents(value: Decimal) -> Result<Decimal> {
    if value.normalize().scale() > SCALE {
        return Err(LedgerError::InvalidAmount(format!(
            "{value} has more than {SCALE} decimal places"
        )));
    }
    let mut cents = value;
    cents.rescale(SCALE);
    Ok(cents)
}

/// Rejects values a NUMERIC(10,2) column cannot hold.
pub fn check_range(value: Decimal, what: &str) -> Result<()> {
    if value.abs() >= MAX_ABS {
        return Err(LedgerError::InvalidAmount(format!(
            "{what} {value} exceeds the NUMERIC(10,2) range"
        )));
    }
    Ok(())
}

/// Validates a strictly positive price or fee at cent precision.
pub fn positive_cents(value: Decimal, what: &str) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!("{what} must be positive")));
    }
    to_cents(value)
}
