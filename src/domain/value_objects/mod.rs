//! Value Objects for the shop

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounds a BRL amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Coupon code value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    pub const BIRTHDAY_PREFIX: &'static str = "ANIV";

    /// `ANIV-<MM><YY>-<8 hex>` with a random suffix.
    pub fn birthday(today: NaiveDate) -> Self { Self::birthday_with_suffix(today, rand::random::<u32>()) }

    pub fn birthday_with_suffix(today: NaiveDate, suffix: u32) -> Self {
        Self(format!("{}-{:02}{:02}-{:08X}", Self::BIRTHDAY_PREFIX, today.month(), today.year().rem_euclid(100), suffix))
    }

    pub fn parse(value: &str) -> Result<Self, CouponCodeError> {
        let value = value.trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 50 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "coupon code is required"), Self::TooLong => write!(f, "coupon code too long") }
    }
}

/// Calendar month key, rendered `YYYY-MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonthYear { year: i32, month: u32 }

impl MonthYear {
    pub fn of(date: NaiveDate) -> Self { Self { year: date.year(), month: date.month() } }

    pub fn parse(value: &str) -> Result<Self, MonthYearError> {
        let (year, month) = value.split_once('-').ok_or(MonthYearError)?;
        let year: i32 = year.parse().map_err(|_| MonthYearError)?;
        let month: u32 = month.parse().map_err(|_| MonthYearError)?;
        if year.to_string().len() != 4 || !(1..=12).contains(&month) { return Err(MonthYearError); }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 { self.year }
    pub fn month(&self) -> u32 { self.month }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:04}-{:02}", self.year, self.month) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct MonthYearError;
impl std::error::Error for MonthYearError {}
impl fmt::Display for MonthYearError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "expected YYYY-MM") }
}

/// Quantity value object; a stored line never holds zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value <= 0 { return Err(QuantityError::NotPositive); }
        match u32::try_from(value) {
            Ok(v) if v <= Self::MAX => Ok(Self(v)),
            _ => Err(QuantityError::TooLarge),
        }
    }
    pub const MAX: u32 = 10_000;
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Result<Self, QuantityError> { Self::new(i64::from(self.0) + i64::from(other.0)) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { NotPositive, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPositive => write!(f, "quantity must be at least 1"),
            Self::TooLarge => write!(f, "quantity must not exceed {}", Quantity::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_birthday_code_format() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 6).unwrap();
        let code = CouponCode::birthday_with_suffix(day, 0xab12);
        assert_eq!(code.as_str(), "ANIV-0325-0000AB12");
        let random = CouponCode::birthday(day);
        assert!(random.as_str().starts_with("ANIV-0325-"));
        assert_eq!(random.as_str().len(), "ANIV-0325-".len() + 8);
    }

    #[test]
    fn test_coupon_code_parse() {
        assert_eq!(CouponCode::parse(" aniv-0325-abc ").unwrap().as_str(), "ANIV-0325-ABC");
        assert_eq!(CouponCode::parse("   "), Err(CouponCodeError::Empty));
    }

    #[test]
    fn test_month_year() {
        let m = MonthYear::parse("2025-07").unwrap();
        assert_eq!((m.year(), m.month()), (2025, 7));
        assert_eq!(m.to_string(), "2025-07");
        assert!(MonthYear::parse("2025-13").is_err());
        assert!(MonthYear::parse("25-01").is_err());
    }

    #[test]
    fn test_quantity() {
        assert_eq!(Quantity::new(0), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::new(-3), Err(QuantityError::NotPositive));
        let q = Quantity::new(2).unwrap();
        assert_eq!(q.add(Quantity::new(3).unwrap()).unwrap().value(), 5);
        assert_eq!(Quantity::new(10_001), Err(QuantityError::TooLarge));
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(5, 0)), Decimal::new(5, 0));
    }
}
