//! Checkout: cart to order in one transaction.
//!
//! Coupon re-validation, the order row, its item snapshot and clearing the
//! cart either all persist or none do.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::cart::clear_steps;
use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::{Order, OrderItem};
use crate::domain::events::{DomainEvent, EventPublisher, OrderEvent};
use crate::domain::value_objects::{round_money, Quantity};
use crate::store::{Database, Transaction};
use crate::{Result, ShopError};

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[serde(rename = "enderecoEntrega", default)]
    #[validate(length(min = 1, message = "is required"))]
    pub address: String,
    #[serde(rename = "itensPedido", default)]
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Vec<CheckoutItem>,
    #[serde(rename = "valorTotal")]
    pub total: Decimal,
    #[serde(rename = "cupomId", default)]
    pub coupon_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    #[serde(rename = "produtoId")]
    pub product_id: Uuid,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
    #[serde(rename = "precoUnitario")]
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    #[serde(rename = "pedidoId")]
    pub order_id: Uuid,
}

struct ValidCheckout {
    total: Decimal,
    coupon_id: Option<Uuid>,
    items: Vec<OrderItem>,
}

fn validate(req: CheckoutRequest) -> Result<ValidCheckout> {
    req.validate()?;
    if req.address.trim().is_empty() {
        return Err(ShopError::BadRequest("address: is required".into()));
    }
    if req.total <= Decimal::ZERO {
        return Err(ShopError::BadRequest("total: must be greater than zero".into()));
    }
    let mut items = Vec::with_capacity(req.items.len());
    for (i, item) in req.items.into_iter().enumerate() {
        let quantity = Quantity::new(item.quantity).map_err(|e| ShopError::BadRequest(format!("items[{i}]: {e}")))?;
        if item.unit_price < Decimal::ZERO {
            return Err(ShopError::BadRequest(format!("items[{i}]: unit price must not be negative")));
        }
        items.push(OrderItem { product_id: item.product_id, quantity, unit_price: round_money(item.unit_price) });
    }
    Ok(ValidCheckout { total: round_money(req.total), coupon_id: req.coupon_id, items })
}

pub async fn checkout(db: &dyn Database, events: &dyn EventPublisher, who: &Identity, req: CheckoutRequest) -> Result<CheckoutReceipt> {
    let valid = validate(req)?;
    let mut tx = db.begin().await?;
    let result = checkout_steps(tx.as_mut(), who.user_id, &valid).await;
    let order = finish(tx, result).await.map_err(|e| {
        tracing::info!(user_id = %who.user_id, error = %e, "checkout rolled back");
        e
    })?;
    tracing::info!(order_id = %order.id, user_id = %order.user_id, total = %order.total, "order placed");

    events
        .publish(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
            coupon_id: order.coupon_id,
        }))
        .await;
    Ok(CheckoutReceipt { order_id: order.id })
}

async fn checkout_steps(tx: &mut dyn Transaction, user_id: Uuid, valid: &ValidCheckout) -> Result<Order> {
    if let Some(coupon_id) = valid.coupon_id {
        if tx.find_unused_coupon(coupon_id, user_id).await?.is_none() {
            return Err(ShopError::Conflict("coupon is invalid, already used or belongs to another user".into()));
        }
        if tx.order_for_coupon(coupon_id).await?.is_some() {
            return Err(ShopError::Conflict("coupon is already linked to an order".into()));
        }
    }

    let order = Order::place(user_id, valid.total, valid.coupon_id, Utc::now().date_naive());
    tx.insert_order(&order).await?;
    for item in &valid.items {
        tx.insert_order_item(order.id, item).await?;
    }
    clear_steps(tx, user_id).await?;
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::services::cart::{add_item, fetch_cart, CartItemRequest};
    use crate::services::coupons::{apply_coupon, ApplyCouponRequest};
    use crate::services::testing::{Fixture, BASE_URL};

    fn item(product_id: Uuid, quantity: i64, cents: i64) -> CheckoutItem {
        CheckoutItem { product_id, quantity, unit_price: Decimal::new(cents, 2) }
    }

    fn request(items: Vec<CheckoutItem>, total_cents: i64, coupon_id: Option<Uuid>) -> CheckoutRequest {
        CheckoutRequest { address: "Rua das Flores, 10".into(), items, total: Decimal::new(total_cents, 2), coupon_id }
    }

    #[tokio::test]
    async fn test_birthday_coupon_checkout() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, CartItemRequest { product_id: p1, quantity: 1 }).await.unwrap();
        let coupon = f.coupon(ana.user_id).await;

        let quote = apply_coupon(&f.db, &ana, ApplyCouponRequest { code: coupon.code.to_string() }).await.unwrap();
        assert_eq!(quote.discount, Decimal::new(500, 2));

        let receipt = checkout(&f.db, &f.events, &ana, request(vec![item(p1, 1, 5000)], 4500, Some(quote.coupon_id)))
            .await
            .unwrap();

        let mut tx = f.db.begin().await.unwrap();
        let order = tx.find_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.total, Decimal::new(4500, 2));
        assert_eq!(order.coupon_id, Some(coupon.id));
        assert_eq!(tx.order_items(order.id).await.unwrap(), vec![OrderItem {
            product_id: p1,
            quantity: Quantity::new(1).unwrap(),
            unit_price: Decimal::new(5000, 2),
        }]);
        drop(tx);

        assert!(fetch_cart(&f.db, &ana, BASE_URL).await.unwrap().items.is_empty());
        let events = f.events.take().await;
        assert!(matches!(events.as_slice(), [DomainEvent::Order(OrderEvent::Placed { .. })]));
    }

    #[tokio::test]
    async fn test_failed_item_leaves_nothing_behind() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, CartItemRequest { product_id: p1, quantity: 2 }).await.unwrap();

        let unknown = Uuid::now_v7();
        let err = checkout(&f.db, &f.events, &ana, request(vec![item(p1, 2, 5000), item(unknown, 1, 100)], 10100, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::BadRequest(_)));

        let mut tx = f.db.begin().await.unwrap();
        assert!(tx.list_orders(None).await.unwrap().is_empty());
        drop(tx);
        let cart = fetch_cart(&f.db, &ana, BASE_URL).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity.value(), 2);
        assert!(f.events.take().await.is_empty());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;

        let mut no_address = request(vec![item(p1, 1, 5000)], 5000, None);
        no_address.address = "  ".into();
        assert!(matches!(checkout(&f.db, &f.events, &ana, no_address).await, Err(ShopError::BadRequest(_))));
        assert!(matches!(checkout(&f.db, &f.events, &ana, request(vec![], 5000, None)).await, Err(ShopError::BadRequest(_))));
        assert!(matches!(
            checkout(&f.db, &f.events, &ana, request(vec![item(p1, 1, 5000)], 0, None)).await,
            Err(ShopError::BadRequest(_))
        ));
        assert!(matches!(
            checkout(&f.db, &f.events, &ana, request(vec![item(p1, 0, 5000)], 5000, None)).await,
            Err(ShopError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_coupon_cannot_back_two_orders() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        let coupon = f.coupon(ana.user_id).await;

        let foreign = checkout(&f.db, &f.events, &bia, request(vec![item(p1, 1, 5000)], 4500, Some(coupon.id))).await;
        assert!(matches!(foreign, Err(ShopError::Conflict(_))));

        checkout(&f.db, &f.events, &ana, request(vec![item(p1, 1, 5000)], 4500, Some(coupon.id))).await.unwrap();
        let second = checkout(&f.db, &f.events, &ana, request(vec![item(p1, 1, 5000)], 4500, Some(coupon.id))).await;
        assert!(matches!(second, Err(ShopError::Conflict(_))));
    }
}
