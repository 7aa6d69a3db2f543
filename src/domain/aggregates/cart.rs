//! Cart Aggregate

use rust_decimal::Decimal;
use uuid::Uuid;
use crate::domain::aggregates::product::ProductImage;
use crate::domain::value_objects::{round_money, Quantity, QuantityError};

/// A stored cart line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
}

/// A cart line joined with its live product data.
#[derive(Clone, Debug)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Quantity,
    pub images: Vec<ProductImage>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity.value()) }
}

pub fn subtotal(lines: &[CartLine]) -> Decimal {
    round_money(lines.iter().map(CartLine::line_total).sum())
}

/// Adding a product already in the cart increments its line.
pub fn merged_quantity(existing: Option<Quantity>, requested: Quantity) -> Result<Quantity, QuantityError> {
    match existing { Some(q) => q.add(requested), None => Ok(requested) }
}

/// Explicit quantity update; zero drops the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantityChange { Set(Quantity), Remove }

impl QuantityChange {
    pub fn from_requested(value: i64) -> Result<Self, QuantityError> {
        if value == 0 { Ok(Self::Remove) } else { Quantity::new(value).map(Self::Set) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: Decimal, qty: i64) -> CartLine {
        CartLine { product_id: Uuid::now_v7(), name: "P".into(), unit_price: price, quantity: Quantity::new(qty).unwrap(), images: vec![] }
    }

    #[test]
    fn test_subtotal() {
        let lines = vec![line(Decimal::new(5000, 2), 1), line(Decimal::new(1999, 2), 3)];
        assert_eq!(subtotal(&lines), Decimal::new(10997, 2));
        assert_eq!(subtotal(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_merge() {
        let one = Quantity::new(1).unwrap();
        assert_eq!(merged_quantity(None, one).unwrap().value(), 1);
        assert_eq!(merged_quantity(Some(one), one).unwrap().value(), 2); // Merged
    }

    #[test]
    fn test_quantity_change() {
        assert_eq!(QuantityChange::from_requested(0).unwrap(), QuantityChange::Remove);
        assert_eq!(QuantityChange::from_requested(4).unwrap(), QuantityChange::Set(Quantity::new(4).unwrap()));
        assert_eq!(QuantityChange::from_requested(-1), Err(QuantityError::NotPositive));
    }
}
