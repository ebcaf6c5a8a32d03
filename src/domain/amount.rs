//! Amount and Balance types
//!
//! Domain primitives for monetary values. Amounts are validated at
//! construction time so an invalid expense or settlement value cannot reach
//! the ledger. All arithmetic is fixed-point (`rust_decimal`), never `f64`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

/// Maximum allowed amount for a single expense or settlement
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0); // 1_000_000_000_000

/// Minor-unit precision shared by every supported currency (cents)
pub const MINOR_UNITS: u32 = 2;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 2 fractional digits
/// - At most one trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use split_ledger::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(1001, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(1001, 2));
/// assert_eq!(amount.to_string(), "10.01");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MINOR_UNITS}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if the value cannot be expressed in cents
    /// - `AmountError::Overflow` if value > one trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // Trailing zeros ("10.500") are fine, real sub-cent digits are not.
        let normalized = value.normalize();
        if normalized.scale() > MINOR_UNITS {
            return Err(AmountError::TooManyDecimals(normalized.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        let mut cents = normalized;
        cents.rescale(MINOR_UNITS);
        Ok(Self(cents))
    }

    /// Create an Amount from a whole number of currency units.
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance is a signed net position in one currency.
///
/// Positive means the user is owed money, negative means the user owes.
/// Unlike Amount, Balance can be zero or negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(Decimal);

impl Balance {
    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Wrap a signed decimal value
    pub fn from_decimal(value: Decimal) -> Self {
        let mut value = value;
        value.rescale(MINOR_UNITS);
        Self(value)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Increase the balance by a positive amount
    pub fn credit(&self, amount: &Amount) -> Balance {
        Balance::from_decimal(self.0 + amount.value())
    }

    /// Decrease the balance by a positive amount
    pub fn debit(&self, amount: &Amount) -> Balance {
        Balance::from_decimal(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_sign_positive() && !self.0.is_zero() {
            write!(f, "+{:.2}", self.0)
        } else {
            write!(f, "{:.2}", self.0)
        }
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Self::Output {
        Balance::from_decimal(self.0 + rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Balance) {
        *self = *self + rhs;
    }
}

impl Sub for Balance {
    type Output = Balance;

    fn sub(self, rhs: Balance) -> Self::Output {
        Balance::from_decimal(self.0 - rhs.0)
    }
}

impl Neg for Balance {
    type Output = Balance;

    fn neg(self) -> Self::Output {
        Balance::from_decimal(-self.0)
    }
}

impl std::iter::Sum for Balance {
    fn sum<I: Iterator<Item = Balance>>(iter: I) -> Self {
        iter.fold(Balance::zero(), |acc, b| acc + b)
    }
}
