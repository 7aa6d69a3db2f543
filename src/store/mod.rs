//! Persistence seam.
//!
//! Every operation runs inside a [`Transaction`] obtained from a [`Database`].
//! Dropping a transaction without committing rolls it back, so a connection is
//! released on every exit path.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    CartItem, CartLine, Coupon, Order, OrderItem, OrderStatus, Position, Product, Ticket, User,
};
use crate::domain::value_objects::{CouponCode, MonthYear, Quantity};

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate {0}")]
    UniqueViolation(String),

    #[error("missing referenced {0}")]
    ForeignKeyViolation(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An order row joined with its customer's name.
#[derive(Clone, Debug)]
pub struct OrderSummary {
    pub order: Order,
    pub customer_name: String,
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;

    // Users
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    async fn clients_born_in(&mut self, month: u32) -> StoreResult<Vec<User>>;
    /// Writes name, e-mail and phone.
    async fn update_user_profile(&mut self, user: &User) -> StoreResult<u64>;
    async fn set_password_hash(&mut self, id: Uuid, hash: &str) -> StoreResult<u64>;
    async fn count_users(&mut self) -> StoreResult<u64>;

    // Products
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;
    async fn list_products(&mut self) -> StoreResult<Vec<Product>>;
    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Rewrites the product row and replaces its image set with `product.images`.
    async fn update_product(&mut self, product: &Product) -> StoreResult<u64>;
    async fn delete_product(&mut self, id: Uuid) -> StoreResult<u64>;

    // Carts
    async fn find_cart(&mut self, user_id: Uuid) -> StoreResult<Option<Uuid>>;
    async fn insert_cart(&mut self, cart_id: Uuid, user_id: Uuid) -> StoreResult<()>;
    async fn find_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<Option<CartItem>>;
    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()>;
    async fn set_cart_item_quantity(&mut self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> StoreResult<u64>;
    async fn delete_cart_item(&mut self, cart_id: Uuid, product_id: Uuid) -> StoreResult<u64>;
    async fn clear_cart(&mut self, cart_id: Uuid) -> StoreResult<u64>;
    async fn cart_lines(&mut self, cart_id: Uuid) -> StoreResult<Vec<CartLine>>;

    // Coupons
    async fn insert_coupon(&mut self, coupon: &Coupon) -> StoreResult<()>;
    async fn coupon_code_exists(&mut self, code: &CouponCode) -> StoreResult<bool>;
    async fn find_coupon_by_code(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    async fn find_unused_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Coupon>>;
    async fn coupon_issued_on(&mut self, owner_id: Uuid, kind_tag: &str, day: NaiveDate) -> StoreResult<bool>;
    /// Conditional: only flips an unused coupon.
    async fn mark_coupon_used(&mut self, id: Uuid, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64>;
    /// Conditional: only flips a used coupon.
    async fn release_coupon(&mut self, id: Uuid, owner_id: Uuid) -> StoreResult<u64>;
    async fn birthday_run_recorded(&mut self, month: MonthYear) -> StoreResult<bool>;
    async fn record_birthday_run(&mut self, month: MonthYear, at: DateTime<Utc>) -> StoreResult<()>;

    // Orders
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn insert_order_item(&mut self, order_id: Uuid, item: &OrderItem) -> StoreResult<()>;
    /// The live (not cancelled) order backed by a coupon.
    async fn order_for_coupon(&mut self, coupon_id: Uuid) -> StoreResult<Option<Uuid>>;
    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;
    /// Writes status and position and raises the unseen flag.
    async fn update_order_state(&mut self, id: Uuid, status: OrderStatus, position: Position) -> StoreResult<u64>;
    async fn list_orders(&mut self, user_id: Option<Uuid>) -> StoreResult<Vec<OrderSummary>>;
    async fn mark_order_seen(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<u64>;
    async fn sales_total(&mut self, status: OrderStatus) -> StoreResult<Decimal>;
    async fn monthly_sales(&mut self, status: OrderStatus, year: i32) -> StoreResult<Vec<(u32, Decimal)>>;

    // Tickets
    async fn insert_ticket(&mut self, ticket: &Ticket) -> StoreResult<()>;
    async fn list_tickets(&mut self) -> StoreResult<Vec<Ticket>>;
    async fn find_ticket(&mut self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn find_ticket_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn delete_ticket(&mut self, id: Uuid) -> StoreResult<u64>;
}
