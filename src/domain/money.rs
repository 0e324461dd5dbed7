use crate::domain::i18n::Lang;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

/// An amount in minor currency units (cents for EUR).
///
/// All ledger arithmetic happens on this type. Conversion to major units is only
/// done for display, see [`to_major`] and [`format_amount`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(pub i64);

impl MinorUnits {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Validates an amount that must be strictly positive, such as a refund request.
    pub fn positive(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Amount stated by the provider. `i64::MIN` has no magnitude in range and is rejected.
    pub fn from_provider(value: i64, field: &str) -> Result<Self> {
        match value.checked_abs() {
            Some(_) => Ok(Self(value)),
            None => Err(PaymentError::malformed(format!(
                "{field} {value} is out of range"
            ))),
        }
    }
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Add for MinorUnits {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MinorUnits {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for MinorUnits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Neg for MinorUnits {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(self.0.saturating_neg())
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of decimal places of an ISO 4217 currency.
pub fn exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Converts minor units to major units of the given currency.
pub fn to_major(amount: MinorUnits, currency: &str) -> Decimal {
    Decimal::new(amount.0, exponent(currency))
}

/// Renders an amount for audit comments, e.g. `5.00 EUR` or `5,00 EUR`.
pub fn format_amount(amount: MinorUnits, currency: &str, lang: Lang) -> String {
    let major = to_major(amount, currency).to_string();
    let major = match lang {
        Lang::De => major.replace('.', ","),
        Lang::En => major,
    };
    format!("{} {}", major, currency.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_units_arithmetic() {
        let a = MinorUnits::new(1000);
        let b = MinorUnits::new(250);
        assert_eq!(a + b, MinorUnits::new(1250));
        assert_eq!(a - b, MinorUnits::new(750));
        assert_eq!(-b, MinorUnits::new(-250));
        assert_eq!((-b).abs(), b);
    }

    #[test]
    fn test_arithmetic_never_wraps() {
        let max = MinorUnits(i64::MAX);
        assert_eq!(max.checked_add(MinorUnits(1)), None);
        assert_eq!(max + MinorUnits(1), max);
        assert_eq!(MinorUnits(i64::MIN).abs(), max);
        assert_eq!(-MinorUnits(i64::MIN), max);
        assert_eq!(MinorUnits(5).checked_sub(MinorUnits(7)), Some(MinorUnits(-2)));
        assert!(matches!(
            MinorUnits::from_provider(i64::MIN, "refund.amount"),
            Err(PaymentError::MalformedNotification(_))
        ));
        assert_eq!(MinorUnits::from_provider(-500, "amount").unwrap(), MinorUnits(-500));
    }

    #[test]
    fn test_positive_validation() {
        assert!(MinorUnits::positive(1).is_ok());
        assert!(matches!(
            MinorUnits::positive(0),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            MinorUnits::positive(-5),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_to_major_uses_currency_exponent() {
        assert_eq!(to_major(MinorUnits(500), "EUR"), dec!(5.00));
        assert_eq!(to_major(MinorUnits(500), "JPY"), dec!(500));
        assert_eq!(to_major(MinorUnits(1500), "KWD"), dec!(1.500));
    }

    #[test]
    fn test_format_amount_is_language_sensitive() {
        assert_eq!(format_amount(MinorUnits(500), "eur", Lang::En), "5.00 EUR");
        assert_eq!(format_amount(MinorUnits(123456), "EUR", Lang::De), "1234,56 EUR");
    }
}
