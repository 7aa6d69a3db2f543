//! Coupon Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::{round_money, CouponCode, MonthYear};

/// Percentage granted by birthday coupons.
pub const BIRTHDAY_DISCOUNT_PERCENT: i64 = 10;

#[derive(Clone, Debug)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub owner_id: Uuid,
    pub month_year: Option<String>,
    pub value: Decimal,
    pub kind: CouponKind,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Birthday coupons are a percentage of the cart; every other tag is a flat amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CouponKind { Birthday, Flat(String) }

impl CouponKind {
    pub const BIRTHDAY_TAG: &'static str = "Aniversario";

    pub fn from_tag(tag: &str) -> Self {
        if tag == Self::BIRTHDAY_TAG { Self::Birthday } else { Self::Flat(tag.to_string()) }
    }

    pub fn tag(&self) -> &str {
        match self { Self::Birthday => Self::BIRTHDAY_TAG, Self::Flat(tag) => tag }
    }
}

/// Why a coupon cannot be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ineligible { AlreadyUsed, LinkedToOrder, NotOwner }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiscountQuote {
    #[serde(rename = "cupomId")]
    pub coupon_id: Uuid,
    #[serde(rename = "valorDesconto")]
    pub discount: Decimal,
    #[serde(rename = "valorTotalCarrinho")]
    pub subtotal: Decimal,
}

impl Coupon {
    pub fn birthday(owner_id: Uuid, code: CouponCode, today: NaiveDate) -> Self {
        Self {
            id: Uuid::now_v7(), code, owner_id, month_year: Some(MonthYear::of(today).to_string()),
            value: Decimal::from(BIRTHDAY_DISCOUNT_PERCENT), kind: CouponKind::Birthday,
            used: false, used_at: None, created_at: Utc::now(),
        }
    }

    /// A used coupon is rejected before anything else is looked at.
    pub fn check_redeemable(&self, user_id: Uuid, linked_order: Option<Uuid>) -> Result<(), Ineligible> {
        if self.used { return Err(Ineligible::AlreadyUsed); }
        if linked_order.is_some() { return Err(Ineligible::LinkedToOrder); }
        if self.owner_id != user_id { return Err(Ineligible::NotOwner); }
        Ok(())
    }

    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        match self.kind {
            CouponKind::Birthday => round_money(subtotal * self.value / Decimal::ONE_HUNDRED),
            CouponKind::Flat(_) => round_money(self.value),
        }
    }

    pub fn quote(&self, subtotal: Decimal) -> DiscountQuote {
        DiscountQuote { coupon_id: self.id, discount: self.discount_for(subtotal), subtotal: round_money(subtotal) }
    }
}
