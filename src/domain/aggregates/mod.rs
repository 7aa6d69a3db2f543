//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;
pub mod ticket;
pub mod user;

pub use cart::{CartItem, CartLine, QuantityChange};
pub use coupon::{Coupon, CouponKind, DiscountQuote, Ineligible};
pub use order::{CouponEffect, Order, OrderItem, OrderStatus, Position, StateChange, StatusUpdate, TransitionError};
pub use product::{Product, ProductImage, ProductStatus};
pub use ticket::Ticket;
pub use user::{Role, User};
