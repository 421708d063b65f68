//! Money and IVA computation
//!
//! Amounts are kept as integer centavos. JSON carries them as decimal pesos
//! (`1160.0`), the database as INTEGER centavos.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// IVA rate in basis points (16%)
pub const IVA_RATE_BASIS_POINTS: i64 = 1600;

/// Largest amount accepted from clients or spreadsheets, in pesos
pub const MAX_PESOS: f64 = 1_000_000_000_000.0;

/// Monetary amount in centavos
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a peso amount, rounding to the nearest centavo
    pub fn from_pesos(pesos: f64) -> Self {
        Self((pesos * 100.0).round() as i64)
    }

    /// Like `from_pesos`, but `None` for non-finite values or anything
    /// beyond `MAX_PESOS` in either direction
    pub fn try_from_pesos(pesos: f64) -> Option<Self> {
        (pesos.is_finite() && pesos.abs() <= MAX_PESOS).then(|| Self::from_pesos(pesos))
    }

    pub fn as_pesos(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// `$12,345.67`
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = (abs / 100).to_string();

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }

        write!(f, "{}${}.{:02}", sign, grouped, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_pesos())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pesos = f64::deserialize(deserializer)?;
        Money::try_from_pesos(pesos).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "amount must be a finite number of at most {MAX_PESOS} pesos"
            ))
        })
    }
}

/// Subtotal, IVA and total of a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaxBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// IVA on a subtotal, rounded half away from zero to the centavo
pub fn iva(subtotal: Money) -> Money {
    // i128 so that no i64 subtotal can overflow the product
    let scaled = i128::from(subtotal.cents()) * i128::from(IVA_RATE_BASIS_POINTS);
    let half = 5_000;
    let rounded = if scaled >= 0 {
        (scaled + half) / 10_000
    } else {
        (scaled - half) / 10_000
    };
    // |rounded| is at most 16% of an i64, so it fits
    Money(rounded as i64)
}

/// Compute the tax breakdown for a subtotal
pub fn compute(subtotal: Money) -> TaxBreakdown {
    let tax = iva(subtotal);
    TaxBreakdown {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}
