//! Order Aggregate
//!
//! Status and position move through an explicit table: every status lists the
//! statuses it may move to and the positions it may sit at. `Concluído` and
//! `Cancelado` pin the position to the same name.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Quantity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Pendente")] Pending,
    #[serde(rename = "Em andamento")] InProgress,
    #[serde(rename = "Concluído")] Completed,
    #[serde(rename = "Cancelado")] Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "Pendente")] Pending,
    #[serde(rename = "Em produção")] InProduction,
    #[serde(rename = "Embalando")] Packing,
    #[serde(rename = "Com transportadora")] WithCarrier,
    #[serde(rename = "Concluído")] Completed,
    #[serde(rename = "Cancelado")] Cancelled,
}

/// What a status change does to the order's linked coupon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CouponEffect { None, Redeem, Release }

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [Self::Pending, Self::InProgress, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::InProgress => "Em andamento",
            Self::Completed => "Concluído",
            Self::Cancelled => "Cancelado",
        }
    }

    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Pending, InProgress, Completed, Cancelled],
            InProgress => &[InProgress, Completed, Cancelled],
            Completed => &[Completed, Cancelled],
            Cancelled => &[Cancelled],
        }
    }

    pub fn allowed_positions(&self) -> &'static [Position] {
        use Position::*;
        match self {
            Self::Pending => &[Pending],
            Self::InProgress => &[Pending, InProduction, Packing, WithCarrier],
            Self::Completed => &[Completed],
            Self::Cancelled => &[Cancelled],
        }
    }

    pub fn forced_position(&self) -> Option<Position> {
        match self {
            Self::Completed => Some(Position::Completed),
            Self::Cancelled => Some(Position::Cancelled),
            _ => None,
        }
    }

    pub fn coupon_effect(&self) -> CouponEffect {
        match self {
            Self::InProgress | Self::Completed => CouponEffect::Redeem,
            Self::Cancelled => CouponEffect::Release,
            Self::Pending => CouponEffect::None,
        }
    }
}

impl Position {
    pub const ALL: [Position; 6] = [Self::InProduction, Self::Packing, Self::WithCarrier, Self::Completed, Self::Cancelled, Self::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::InProduction => "Em produção",
            Self::Packing => "Embalando",
            Self::WithCarrier => "Com transportadora",
            Self::Completed => "Concluído",
            Self::Cancelled => "Cancelado",
        }
    }
}

fn join<T: Copy>(values: &[T], name: impl Fn(T) -> &'static str) -> String {
    values.iter().map(|v| name(*v)).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or_else(|| {
            format!("Invalid status: {s}. Allowed: {}.", join(&Self::ALL, |v| v.as_str()))
        })
    }
}

impl FromStr for Position {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or_else(|| {
            format!("Invalid position: {s}. Allowed: {}.", join(&Self::ALL, |v| v.as_str()))
        })
    }
}

#[derive(Clone, Debug)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub position: Position,
    pub date: NaiveDate,
    pub total: Decimal,
    pub coupon_id: Option<Uuid>,
    /// Set on every admin update, cleared when the customer has seen it.
    pub updated: bool,
    pub created_at: DateTime<Utc>,
}

/// Line frozen at checkout; never re-derived from the live product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    #[serde(rename = "produtoId")]
    pub product_id: Uuid,
    #[serde(rename = "quantidade")]
    pub quantity: Quantity,
    #[serde(rename = "precoUnitario")]
    pub unit_price: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusUpdate { pub status: Option<OrderStatus>, pub position: Option<Position> }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange { pub status: OrderStatus, pub position: Position, pub coupon: CouponEffect }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    NothingToUpdate,
    Status { from: OrderStatus, to: OrderStatus },
    Position { status: OrderStatus, position: Position },
}

impl std::error::Error for TransitionError {}
impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToUpdate => write!(f, "No status or position supplied"),
            Self::Status { from, to } => write!(
                f, "Cannot move order from {from} to {to}. Allowed: {}.", join(from.allowed_next(), |v| v.as_str())
            ),
            Self::Position { status, position } => write!(
                f, "Position {position} is not valid while {status}. Allowed: {}.", join(status.allowed_positions(), |v| v.as_str())
            ),
        }
    }
}

impl Order {
    pub fn place(user_id: Uuid, total: Decimal, coupon_id: Option<Uuid>, today: NaiveDate) -> Self {
        Self {
            id: Uuid::now_v7(), user_id, status: OrderStatus::Pending, position: Position::Pending,
            date: today, total, coupon_id, updated: false, created_at: Utc::now(),
        }
    }

    /// Resolves an admin update against the transition table.
    pub fn plan(&self, update: StatusUpdate) -> Result<StateChange, TransitionError> {
        if update.status.is_none() && update.position.is_none() { return Err(TransitionError::NothingToUpdate); }
        let status = update.status.unwrap_or(self.status);
        if !self.status.allowed_next().contains(&status) {
            return Err(TransitionError::Status { from: self.status, to: status });
        }
        let position = status.forced_position().or(update.position).unwrap_or(self.position);
        if !status.allowed_positions().contains(&position) {
            return Err(TransitionError::Position { status, position });
        }
        // Only a status change moves the coupon; repeating the current status is a no-op for it.
        let coupon = match update.status {
            Some(next) if next != self.status => next.coupon_effect(),
            _ => CouponEffect::None,
        };
        Ok(StateChange { status, position, coupon })
    }

    pub fn apply(&mut self, change: StateChange) {
        self.status = change.status;
        self.position = change.position;
        self.updated = true;
    }
}
