//! Monetary types
//!
//! `Amount` is a validated outbound payment amount (what we ask a provider to
//! collect). `Money` is a normalized provider-reported value in major units
//! with an ISO 4217 currency code. Every adapter converts into `Money` before
//! returning, so callers never see cents or kobo.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum single payment amount (1 billion major units)
const MAX_AMOUNT: i64 = 1_000_000_000;

/// Maximum decimal places accepted for a payment amount
const MAX_SCALE: u32 = 2;

/// Largest exponent `Decimal` can carry
const MAX_EXPONENT: u32 = 28;

/// A positive payment amount in major currency units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 2 decimal places
/// - At most 1 billion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use subscription_tracker::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(1500, 0)).unwrap();
/// assert_eq!(amount.whole_units(), Some(1500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let value = value.normalize();
        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > Decimal::from(MAX_AMOUNT) {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount as an integer, if it has no fractional part.
    ///
    /// Mobile-money push APIs only accept whole units.
    pub fn whole_units(&self) -> Option<i64> {
        if self.0.fract().is_zero() {
            self.0.to_i64()
        } else {
            None
        }
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
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
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

/// Three-letter ISO 4217 currency code, always upper case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const KES: CurrencyCode = CurrencyCode(*b"KES");
    pub const NGN: CurrencyCode = CurrencyCode(*b"NGN");
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");

    /// Parse a currency code, accepting any letter case ("kes", "Kes").
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyCode::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyCode::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

/// Errors raised while normalizing provider amounts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Minor unit exponent out of range: {0}")]
    ExponentOutOfRange(u32),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

/// A provider-reported amount in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl Money {
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Convert a minor-unit integer (cents, kobo) to major units.
    ///
    /// `exponent` is the number of minor-unit digits: 2 for cents, 0 for
    /// currencies without a subdivision. `150000` with exponent 2 is `1500.00`.
    pub fn from_minor_units(
        minor: i64,
        exponent: u32,
        currency: CurrencyCode,
    ) -> Result<Self, MoneyError> {
        if exponent > MAX_EXPONENT {
            return Err(MoneyError::ExponentOutOfRange(exponent));
        }
        Ok(Self::new(Decimal::new(minor, exponent), currency))
    }

    /// Parse a major-unit decimal string ("1500.25").
    pub fn parse_major(value: &str, currency: CurrencyCode) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(value.trim())
            .map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Ok(Self::new(amount, currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}
