//! Order lifecycle: admin status updates with coupon reconciliation,
//! order history and sales figures.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::{CouponEffect, Order, OrderItem, OrderStatus, Position, StateChange, StatusUpdate};
use crate::domain::events::{CouponEvent, DomainEvent, EventPublisher, OrderEvent};
use crate::store::{Database, OrderSummary, Transaction};
use crate::{Result, ShopError};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "posicao", default)]
    pub position: Option<String>,
}

impl UpdateOrderRequest {
    fn parse(&self) -> Result<StatusUpdate> {
        let status = self.status.as_deref().map(str::parse::<OrderStatus>).transpose().map_err(ShopError::BadRequest)?;
        let position = self.position.as_deref().map(str::parse::<Position>).transpose().map_err(ShopError::BadRequest)?;
        Ok(StatusUpdate { status, position })
    }
}

/// What happened to the order's coupon during a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponOutcome {
    None,
    MarkedUsed,
    Released,
    /// The conditional update touched no row; the coupon was already in the target state.
    Unchanged,
}

#[derive(Debug, Serialize)]
pub struct OrderUpdated {
    pub status: OrderStatus,
    #[serde(rename = "posicao")]
    pub position: Position,
    #[serde(rename = "atualizado")]
    pub updated: bool,
    #[serde(rename = "cupom")]
    pub coupon: CouponOutcome,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    #[serde(rename = "usuarioId")]
    pub user_id: Uuid,
    #[serde(rename = "nomeCliente")]
    pub customer_name: String,
    pub status: OrderStatus,
    #[serde(rename = "posicao")]
    pub position: Position,
    #[serde(rename = "data")]
    pub date: NaiveDate,
    #[serde(rename = "valor")]
    pub total: Decimal,
    #[serde(rename = "cupomId")]
    pub coupon_id: Option<Uuid>,
    #[serde(rename = "atualizado")]
    pub updated: bool,
}

impl From<OrderSummary> for OrderView {
    fn from(s: OrderSummary) -> Self {
        let o = s.order;
        Self {
            id: o.id,
            user_id: o.user_id,
            customer_name: s.customer_name,
            status: o.status,
            position: o.position,
            date: o.date,
            total: o.total,
            coupon_id: o.coupon_id,
            updated: o.updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderView,
    #[serde(rename = "itens")]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MonthlySales {
    #[serde(rename = "mes")]
    pub month: u32,
    pub total: Decimal,
}

/// Admin-only. Moves an order through the transition table and reconciles
/// its coupon with the new status.
pub async fn update_order_status(
    db: &dyn Database,
    events: &dyn EventPublisher,
    who: &Identity,
    order_id: Uuid,
    req: UpdateOrderRequest,
) -> Result<OrderUpdated> {
    who.require_admin()?;
    let update = req.parse()?;

    let mut tx = db.begin().await?;
    let result = update_steps(tx.as_mut(), order_id, update).await;
    let (order, change, outcome) = finish(tx, result).await?;
    tracing::info!(
        %order_id,
        admin_id = %who.user_id,
        status = %change.status,
        position = %change.position,
        coupon = ?outcome,
        "order updated"
    );

    events
        .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id, status: change.status, position: change.position }))
        .await;
    if let Some(coupon_id) = order.coupon_id {
        let event = match outcome {
            CouponOutcome::MarkedUsed => Some(CouponEvent::Redeemed { coupon_id, order_id }),
            CouponOutcome::Released => Some(CouponEvent::Released { coupon_id, order_id }),
            CouponOutcome::None | CouponOutcome::Unchanged => None,
        };
        if let Some(event) = event {
            events.publish(DomainEvent::Coupon(event)).await;
        }
    }

    Ok(OrderUpdated { status: change.status, position: change.position, updated: true, coupon: outcome })
}

async fn update_steps(tx: &mut dyn Transaction, order_id: Uuid, update: StatusUpdate) -> Result<(Order, StateChange, CouponOutcome)> {
    let mut order = tx.find_order(order_id).await?.ok_or_else(|| ShopError::NotFound("order not found".into()))?;
    let change = order.plan(update).map_err(|e| ShopError::BadRequest(e.to_string()))?;
    if tx.update_order_state(order.id, change.status, change.position).await? == 0 {
        return Err(ShopError::NotFound("order not found".into()));
    }
    order.apply(change);
    let outcome = reconcile_coupon(tx, &order, change.coupon).await?;
    Ok((order, change, outcome))
}

/// Best effort: a no-op is logged and reported, never fatal.
async fn reconcile_coupon(tx: &mut dyn Transaction, order: &Order, effect: CouponEffect) -> Result<CouponOutcome> {
    let Some(coupon_id) = order.coupon_id else { return Ok(CouponOutcome::None) };
    let (touched, done) = match effect {
        CouponEffect::None => return Ok(CouponOutcome::None),
        CouponEffect::Redeem => (tx.mark_coupon_used(coupon_id, order.user_id, Utc::now()).await?, CouponOutcome::MarkedUsed),
        CouponEffect::Release => {
            if let Some(holder) = tx.order_for_coupon(coupon_id).await?.filter(|h| *h != order.id) {
                tracing::warn!(order_id = %order.id, %coupon_id, %holder, "coupon is held by another live order, not released");
                return Ok(CouponOutcome::Unchanged);
            }
            (tx.release_coupon(coupon_id, order.user_id).await?, CouponOutcome::Released)
        }
    };
    if touched == 0 {
        tracing::warn!(order_id = %order.id, %coupon_id, ?effect, "coupon reconciliation changed nothing");
        return Ok(CouponOutcome::Unchanged);
    }
    Ok(done)
}

/// Administrators see every order; customers see their own.
pub async fn list_orders(db: &dyn Database, who: &Identity) -> Result<Vec<OrderView>> {
    let scope = if who.is_admin() { None } else { Some(who.user_id) };
    let mut tx = db.begin().await?;
    let listed = tx.list_orders(scope).await.map_err(ShopError::from);
    Ok(finish(tx, listed).await?.into_iter().map(OrderView::from).collect())
}

pub async fn get_order(db: &dyn Database, who: &Identity, order_id: Uuid) -> Result<OrderDetail> {
    let mut tx = db.begin().await?;
    let result = detail_steps(tx.as_mut(), who, order_id).await;
    finish(tx, result).await
}

async fn detail_steps(tx: &mut dyn Transaction, who: &Identity, order_id: Uuid) -> Result<OrderDetail> {
    let order = tx.find_order(order_id).await?.ok_or_else(|| ShopError::NotFound("order not found".into()))?;
    who.require_owner_or_admin(order.user_id)?;
    let customer_name = tx.find_user(order.user_id).await?.map(|u| u.name).unwrap_or_default();
    let items = tx.order_items(order.id).await?;
    Ok(OrderDetail { order: OrderSummary { order, customer_name }.into(), items })
}

/// Clears the unseen-update flag on the caller's own order.
pub async fn mark_seen(db: &dyn Database, who: &Identity, order_id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let result = match tx.mark_order_seen(order_id, who.user_id).await {
        Ok(0) => Err(ShopError::NotFound("order not found".into())),
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    };
    finish(tx, result).await
}

/// Sum of completed orders.
pub async fn sales_total(db: &dyn Database, who: &Identity) -> Result<Decimal> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let total = tx.sales_total(OrderStatus::Completed).await.map_err(ShopError::from);
    finish(tx, total).await
}

/// Completed sales per month, January to December, zero-filled.
pub async fn monthly_sales(db: &dyn Database, who: &Identity, year: i32) -> Result<Vec<MonthlySales>> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let rows = tx.monthly_sales(OrderStatus::Completed, year).await.map_err(ShopError::from);
    let rows = finish(tx, rows).await?;
    Ok((1..=12)
        .map(|month| MonthlySales {
            month,
            total: rows.iter().find(|(m, _)| *m == month).map_or(Decimal::ZERO, |(_, t)| *t),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use crate::domain::aggregates::Role;
    use crate::services::checkout::{checkout, CheckoutItem, CheckoutRequest};
    use crate::services::testing::Fixture;

    async fn placed_order(f: &Fixture, who: &Identity, coupon_id: Option<Uuid>) -> Uuid {
        let p = f.product(&format!("Charada {}", Uuid::now_v7()), 5000).await;
        let req = CheckoutRequest {
            address: "Rua das Flores, 10".into(),
            items: vec![CheckoutItem { product_id: p, quantity: 1, unit_price: Decimal::new(5000, 2) }],
            total: Decimal::new(4500, 2),
            coupon_id,
        };
        let order_id = checkout(&f.db, &f.events, who, req).await.unwrap().order_id;
        f.events.take().await;
        order_id
    }

    fn set(status: Option<&str>, position: Option<&str>) -> UpdateOrderRequest {
        UpdateOrderRequest { status: status.map(String::from), position: position.map(String::from) }
    }

    async fn coupon_used(f: &Fixture, owner: Uuid, coupon_id: Uuid) -> bool {
        let mut tx = f.db.begin().await.unwrap();
        tx.find_unused_coupon(coupon_id, owner).await.unwrap().is_none()
    }

    #[tokio::test]
    async fn test_coupon_follows_order_status() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        let order_id = placed_order(&f, &ana, Some(coupon.id)).await;
        assert!(!coupon_used(&f, ana.user_id, coupon.id).await);

        let done = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Concluído"), None)).await.unwrap();
        assert_eq!((done.status, done.position, done.coupon), (OrderStatus::Completed, Position::Completed, CouponOutcome::MarkedUsed));
        assert!(coupon_used(&f, ana.user_id, coupon.id).await);

        let cancelled = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Cancelado"), None)).await.unwrap();
        assert_eq!(cancelled.position, Position::Cancelled);
        assert_eq!(cancelled.coupon, CouponOutcome::Released);
        assert!(!coupon_used(&f, ana.user_id, coupon.id).await);

        let events = f.events.take().await;
        assert!(events.contains(&DomainEvent::Coupon(CouponEvent::Redeemed { coupon_id: coupon.id, order_id })));
        assert!(events.contains(&DomainEvent::Coupon(CouponEvent::Released { coupon_id: coupon.id, order_id })));
    }

    #[tokio::test]
    async fn test_cancelled_order_frees_coupon_for_a_new_order() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        let first = placed_order(&f, &ana, Some(coupon.id)).await;
        update_order_status(&f.db, &f.events, &admin, first, set(Some("Cancelado"), None)).await.unwrap();
        placed_order(&f, &ana, Some(coupon.id)).await;
    }

    #[tokio::test]
    async fn test_recancelling_old_order_keeps_coupon_of_newer_order() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;

        let first = placed_order(&f, &ana, Some(coupon.id)).await;
        update_order_status(&f.db, &f.events, &admin, first, set(Some("Concluído"), None)).await.unwrap();
        update_order_status(&f.db, &f.events, &admin, first, set(Some("Cancelado"), None)).await.unwrap();

        let second = placed_order(&f, &ana, Some(coupon.id)).await;
        update_order_status(&f.db, &f.events, &admin, second, set(Some("Concluído"), None)).await.unwrap();
        assert!(coupon_used(&f, ana.user_id, coupon.id).await);
        f.events.take().await;

        let again = update_order_status(&f.db, &f.events, &admin, first, set(Some("Cancelado"), None)).await.unwrap();
        assert_eq!(again.coupon, CouponOutcome::None);
        assert!(coupon_used(&f, ana.user_id, coupon.id).await);
        assert!(!f.events.take().await.iter().any(|e| matches!(e, DomainEvent::Coupon(_))));
    }

    #[tokio::test]
    async fn test_release_skips_coupon_held_by_another_order() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        let live = placed_order(&f, &ana, Some(coupon.id)).await;
        update_order_status(&f.db, &f.events, &admin, live, set(Some("Concluído"), None)).await.unwrap();

        let mut stale = Order::place(ana.user_id, Decimal::new(4500, 2), Some(coupon.id), Utc::now().date_naive());
        stale.status = OrderStatus::Cancelled;
        let mut tx = f.db.begin().await.unwrap();
        let outcome = reconcile_coupon(tx.as_mut(), &stale, CouponEffect::Release).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outcome, CouponOutcome::Unchanged);
        assert!(coupon_used(&f, ana.user_id, coupon.id).await);
    }

    #[tokio::test]
    async fn test_reconciliation_no_op_is_reported() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        let order_id = placed_order(&f, &ana, Some(coupon.id)).await;

        let first = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Em andamento"), Some("Em produção"))).await.unwrap();
        assert_eq!(first.coupon, CouponOutcome::MarkedUsed);
        let second = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Concluído"), None)).await.unwrap();
        assert_eq!(second.coupon, CouponOutcome::Unchanged);
        assert_eq!(second.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_forces_position_and_sets_unseen() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let order_id = placed_order(&f, &ana, None).await;

        let res = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Cancelado"), Some("Embalando"))).await.unwrap();
        assert_eq!(res.position, Position::Cancelled);
        assert_eq!(res.coupon, CouponOutcome::None);

        let detail = get_order(&f.db, &ana, order_id).await.unwrap();
        assert!(detail.order.updated);
        mark_seen(&f.db, &ana, order_id).await.unwrap();
        assert!(!get_order(&f.db, &ana, order_id).await.unwrap().order.updated);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_update() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let order_id = placed_order(&f, &ana, None).await;

        let err = update_order_status(&f.db, &f.events, &ana, order_id, set(Some("Concluído"), None)).await.unwrap_err();
        assert!(matches!(err, ShopError::Forbidden(_)));
        let detail = get_order(&f.db, &ana, order_id).await.unwrap();
        assert_eq!((detail.order.status, detail.order.updated), (OrderStatus::Pending, false));
        assert!(f.events.take().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_updates() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let order_id = placed_order(&f, &ana, None).await;

        let unknown = update_order_status(&f.db, &f.events, &admin, Uuid::now_v7(), set(Some("Concluído"), None)).await;
        assert!(matches!(unknown, Err(ShopError::NotFound(_))));
        let bad_value = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Enviado"), None)).await;
        assert!(matches!(bad_value, Err(ShopError::BadRequest(m)) if m.contains("Allowed")));
        let empty = update_order_status(&f.db, &f.events, &admin, order_id, set(None, None)).await;
        assert!(matches!(empty, Err(ShopError::BadRequest(_))));

        update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Concluído"), None)).await.unwrap();
        let back = update_order_status(&f.db, &f.events, &admin, order_id, set(Some("Pendente"), None)).await;
        assert!(matches!(back, Err(ShopError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_listing_and_visibility() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let ana_order = placed_order(&f, &ana, None).await;
        placed_order(&f, &bia, None).await;

        assert_eq!(list_orders(&f.db, &admin).await.unwrap().len(), 2);
        let own = list_orders(&f.db, &ana).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].customer_name, "Ana");

        assert!(matches!(get_order(&f.db, &bia, ana_order).await, Err(ShopError::Forbidden(_))));
        assert_eq!(get_order(&f.db, &admin, ana_order).await.unwrap().items.len(), 1);
        assert!(matches!(mark_seen(&f.db, &bia, ana_order).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sales_figures() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let done = placed_order(&f, &ana, None).await;
        placed_order(&f, &ana, None).await;
        update_order_status(&f.db, &f.events, &admin, done, set(Some("Concluído"), None)).await.unwrap();

        assert_eq!(sales_total(&f.db, &admin).await.unwrap(), Decimal::new(4500, 2));
        let monthly = monthly_sales(&f.db, &admin, Utc::now().year()).await.unwrap();
        assert_eq!(monthly.len(), 12);
        assert_eq!(monthly.iter().map(|m| m.total).sum::<Decimal>(), Decimal::new(4500, 2));
        assert!(matches!(sales_total(&f.db, &ana).await, Err(ShopError::Forbidden(_))));
    }
}
