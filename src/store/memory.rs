//! In-process store with the same constraint semantics as the Postgres schema.
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! copy; commit swaps the copy in, drop discards it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Database, OrderSummary, StoreError, StoreResult, Transaction};
use crate::domain::aggregates::{
    CartItem, CartLine, Coupon, Order, OrderItem, OrderStatus, Position, Product, Role, Ticket, User,
};
use crate::domain::value_objects::{CouponCode, MonthYear, Quantity};

#[derive(Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    products: Vec<Product>,
    carts: HashMap<Uuid, Uuid>,
    cart_items: Vec<CartItem>,
    coupons: Vec<Coupon>,
    orders: Vec<Order>,
    order_items: Vec<(Uuid, OrderItem)>,
    tickets: Vec<Ticket>,
    birthday_runs: Vec<(MonthYear, DateTime<Utc>)>,
}

impl MemoryState {
    fn user_exists(&self, id: Uuid) -> bool { self.users.iter().any(|u| u.id == id) }
    fn product_exists(&self, id: Uuid) -> bool { self.products.iter().any(|p| p.id == id) }
    fn order_exists(&self, id: Uuid) -> bool { self.orders.iter().any(|o| o.id == id) }
}

#[derive(Clone, Default)]
pub struct MemoryDatabase { state: Arc<Mutex<MemoryState>> }

impl MemoryDatabase {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, work }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

fn count(n: usize) -> u64 { u64::try_from(n).unwrap_or(u64::MAX) }

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> { Ok(()) }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.work.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("user e-mail".into()));
        }
        self.work.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.work.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.work.users.iter().find(|u| u.email == email).cloned())
    }

    async fn clients_born_in(&mut self, month: u32) -> StoreResult<Vec<User>> {
        Ok(self.work.users.iter().filter(|u| u.role == Role::Cliente && u.born_in_month(month)).cloned().collect())
    }

    async fn update_user_profile(&mut self, user: &User) -> StoreResult<u64> {
        if self.work.users.iter().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::UniqueViolation("user e-mail".into()));
        }
        let Some(stored) = self.work.users.iter_mut().find(|u| u.id == user.id) else { return Ok(0) };
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.phone = user.phone.clone();
        Ok(1)
    }

    async fn set_password_hash(&mut self, id: Uuid, hash: &str) -> StoreResult<u64> {
        let Some(stored) = self.work.users.iter_mut().find(|u| u.id == id) else { return Ok(0) };
        stored.password_hash = hash.to_string();
        Ok(1)
    }

    async fn count_users(&mut self) -> StoreResult<u64> { Ok(count(self.work.users.len())) }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        if self.work.products.iter().any(|p| p.name == product.name) {
            return Err(StoreError::UniqueViolation("product name".into()));
        }
        self.work.products.push(product.clone());
        Ok(())
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        let mut products = self.work.products.clone();
        products.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(products)
    }

    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.work.products.iter().find(|p| p.id == id).cloned())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<u64> {
        if self.work.products.iter().any(|p| p.id != product.id && p.name == product.name) {
            return Err(StoreError::UniqueViolation("product name".into()));
        }
        let Some(stored) = self.work.products.iter_mut().find(|p| p.id == product.id) else { return Ok(0) };
        *stored = Product { created_at: stored.created_at, ..product.clone() };
        Ok(1)
    }

    async fn delete_product(&mut self, id: Uuid) -> StoreResult<u64> {
        if self.work.order_items.iter().any(|(_, i)| i.product_id == id) {
            return Err(StoreError::ForeignKeyViolation("product is part of an order".into()));
        }
        self.work.cart_items.retain(|i| i.product_id != id);
        let before = self.work.products.len();
        self.work.products.retain(|p| p.id != id);
        Ok(count(before - self.work.products.len()))
    }

    async fn find_cart(&mut self, user_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.work.carts.iter().find(|(_, owner)| **owner == user_id).map(|(id, _)| *id))
    }

    async fn insert_cart(&mut self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        if !self.work.user_exists(user_id) { return Err(StoreError::ForeignKeyViolation("user".into())); }
        if self.work.carts.values().any(|owner| *owner == user_id) {
            return Err(StoreError::UniqueViolation("cart for user".into()));
        }
        self.work.carts.insert(cart_id, user_id);
        Ok(())
    }

    async fn find_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self.work.cart_items.iter().find(|i| i.cart_id == cart_id && i.product_id == product_id).cloned())
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()> {
        if !self.work.carts.contains_key(&item.cart_id) { return Err(StoreError::ForeignKeyViolation("cart".into())); }
        if !self.work.product_exists(item.product_id) { return Err(StoreError::ForeignKeyViolation("product".into())); }
        if self.work.cart_items.iter().any(|i| i.cart_id == item.cart_id && i.product_id == item.product_id) {
            return Err(StoreError::UniqueViolation("cart line".into()));
        }
        self.work.cart_items.push(item.clone());
        Ok(())
    }

    async fn set_cart_item_quantity(&mut self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> StoreResult<u64> {
        let mut touched = 0;
        for item in self.work.cart_items.iter_mut().filter(|i| i.cart_id == cart_id && i.product_id == product_id) {
            item.quantity = quantity;
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<u64> {
        let before = self.work.cart_items.len();
        self.work.cart_items.retain(|i| !(i.cart_id == cart_id && i.product_id == product_id));
        Ok(count(before - self.work.cart_items.len()))
    }

    async fn clear_cart(&mut self, cart_id: Uuid) -> StoreResult<u64> {
        let before = self.work.cart_items.len();
        self.work.cart_items.retain(|i| i.cart_id != cart_id);
        Ok(count(before - self.work.cart_items.len()))
    }

    async fn cart_lines(&mut self, cart_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let lines = self.work.cart_items.iter()
            .filter(|i| i.cart_id == cart_id)
            .filter_map(|i| {
                let p = self.work.products.iter().find(|p| p.id == i.product_id)?;
                Some(CartLine { product_id: p.id, name: p.name.clone(), unit_price: p.price, quantity: i.quantity, images: p.images.clone() })
            })
            .collect();
        Ok(lines)
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> StoreResult<()> {
        if !self.work.user_exists(coupon.owner_id) { return Err(StoreError::ForeignKeyViolation("user".into())); }
        if self.work.coupons.iter().any(|c| c.code == coupon.code) {
            return Err(StoreError::UniqueViolation("coupon code".into()));
        }
        self.work.coupons.push(coupon.clone());
        Ok(())
    }

    async fn coupon_code_exists(&mut self, code: &CouponCode) -> StoreResult<bool> {
        Ok(self.work.coupons.iter().any(|c| &c.code == code))
    }

    async fn find_coupon_by_code(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.work.coupons.iter().find(|c| &c.code == code).cloned())
    }

    async fn find_unused_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Coupon>> {
        Ok(self.work.coupons.iter().find(|c| c.id == id && c.owner_id == owner_id && !c.used).cloned())
    }

    async fn coupon_issued_on(&mut self, owner_id: Uuid, kind_tag: &str, day: NaiveDate) -> StoreResult<bool> {
        Ok(self.work.coupons.iter().any(|c| c.owner_id == owner_id && c.kind.tag() == kind_tag && c.created_at.date_naive() == day))
    }

    async fn mark_coupon_used(&mut self, id: Uuid, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut touched = 0;
        for c in self.work.coupons.iter_mut().filter(|c| c.id == id && c.owner_id == owner_id && !c.used) {
            c.used = true;
            c.used_at = Some(at);
            touched += 1;
        }
        Ok(touched)
    }

    async fn release_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<u64> {
        let mut touched = 0;
        for c in self.work.coupons.iter_mut().filter(|c| c.id == id && c.owner_id == owner_id && c.used) {
            c.used = false;
            c.used_at = None;
            touched += 1;
        }
        Ok(touched)
    }

    async fn birthday_run_recorded(&mut self, month: MonthYear) -> StoreResult<bool> {
        Ok(self.work.birthday_runs.iter().any(|(m, _)| *m == month))
    }

    async fn record_birthday_run(&mut self, month: MonthYear, at: DateTime<Utc>) -> StoreResult<()> {
        if self.work.birthday_runs.iter().any(|(m, _)| *m == month) {
            return Err(StoreError::UniqueViolation("birthday run".into()));
        }
        self.work.birthday_runs.push((month, at));
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        if !self.work.user_exists(order.user_id) { return Err(StoreError::ForeignKeyViolation("user".into())); }
        if let Some(coupon_id) = order.coupon_id {
            if !self.work.coupons.iter().any(|c| c.id == coupon_id) {
                return Err(StoreError::ForeignKeyViolation("coupon".into()));
            }
            if self.work.orders.iter().any(|o| o.coupon_id == Some(coupon_id) && o.status != OrderStatus::Cancelled) {
                return Err(StoreError::UniqueViolation("order for coupon".into()));
            }
        }
        self.work.orders.push(order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, order_id: Uuid, item: &OrderItem) -> StoreResult<()> {
        if !self.work.order_exists(order_id) { return Err(StoreError::ForeignKeyViolation("order".into())); }
        if !self.work.product_exists(item.product_id) { return Err(StoreError::ForeignKeyViolation("product".into())); }
        self.work.order_items.push((order_id, item.clone()));
        Ok(())
    }

    async fn order_for_coupon(&mut self, coupon_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.work.orders.iter()
            .find(|o| o.coupon_id == Some(coupon_id) && o.status != OrderStatus::Cancelled)
            .map(|o| o.id))
    }

    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.work.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self.work.order_items.iter().filter(|(id, _)| *id == order_id).map(|(_, i)| i.clone()).collect())
    }

    async fn update_order_state(&mut self, id: Uuid, status: OrderStatus, position: Position) -> StoreResult<u64> {
        let mut touched = 0;
        for o in self.work.orders.iter_mut().filter(|o| o.id == id) {
            o.status = status;
            o.position = position;
            o.updated = true;
            touched += 1;
        }
        Ok(touched)
    }

    async fn list_orders(&mut self, user_id: Option<Uuid>) -> StoreResult<Vec<OrderSummary>> {
        let mut rows: Vec<OrderSummary> = self.work.orders.iter()
            .filter(|o| user_id.map_or(true, |u| o.user_id == u))
            .map(|o| OrderSummary {
                order: o.clone(),
                customer_name: self.work.users.iter().find(|u| u.id == o.user_id).map(|u| u.name.clone()).unwrap_or_default(),
            })
            .collect();
        rows.sort_by(|a, b| (b.order.date, b.order.id).cmp(&(a.order.date, a.order.id)));
        Ok(rows)
    }

    async fn mark_order_seen(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let mut touched = 0;
        for o in self.work.orders.iter_mut().filter(|o| o.id == id && o.user_id == user_id) {
            o.updated = false;
            touched += 1;
        }
        Ok(touched)
    }

    async fn sales_total(&mut self, status: OrderStatus) -> StoreResult<Decimal> {
        Ok(self.work.orders.iter().filter(|o| o.status == status).map(|o| o.total).sum())
    }

    async fn monthly_sales(&mut self, status: OrderStatus, year: i32) -> StoreResult<Vec<(u32, Decimal)>> {
        let mut by_month: HashMap<u32, Decimal> = HashMap::new();
        for o in self.work.orders.iter().filter(|o| o.status == status && o.date.year() == year) {
            *by_month.entry(o.date.month()).or_default() += o.total;
        }
        let mut rows: Vec<(u32, Decimal)> = by_month.into_iter().collect();
        rows.sort_by_key(|(m, _)| *m);
        Ok(rows)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        if !self.work.order_exists(ticket.order_id) { return Err(StoreError::ForeignKeyViolation("order".into())); }
        self.work.tickets.push(ticket.clone());
        Ok(())
    }

    async fn list_tickets(&mut self) -> StoreResult<Vec<Ticket>> {
        let mut tickets = self.work.tickets.clone();
        tickets.sort_by(|a, b| (b.opened_at, b.id).cmp(&(a.opened_at, a.id)));
        Ok(tickets)
    }

    async fn find_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.work.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn find_ticket_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.work.tickets.iter().find(|t| t.order_id == order_id).cloned())
    }

    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<u64> {
        let before = self.work.tickets.len();
        self.work.tickets.retain(|t| t.id != id);
        Ok(count(before - self.work.tickets.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded() {
        let db = MemoryDatabase::new();
        let user = User::new("Ana", "ana@example.com", "hash", Role::Cliente);
        {
            let mut tx = db.begin().await.unwrap();
            tx.insert_user(&user).await.unwrap();
            // dropped without commit
        }
        let mut tx = db.begin().await.unwrap();
        assert!(tx.find_user(user.id).await.unwrap().is_none());
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(tx.find_user(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_constraints() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let user = User::new("Ana", "ana@example.com", "hash", Role::Cliente);
        tx.insert_user(&user).await.unwrap();
        let dup = User::new("Ana 2", "ana@example.com", "hash", Role::Cliente);
        assert!(matches!(tx.insert_user(&dup).await, Err(StoreError::UniqueViolation(_))));

        let cart = Uuid::now_v7();
        tx.insert_cart(cart, user.id).await.unwrap();
        let item = CartItem { id: Uuid::now_v7(), cart_id: cart, product_id: Uuid::now_v7(), quantity: Quantity::new(1).unwrap() };
        assert!(matches!(tx.insert_cart_item(&item).await, Err(StoreError::ForeignKeyViolation(_))));
    }
}
