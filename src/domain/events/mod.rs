//! Domain events
//!
//! Published after a transaction commits so collaborators (e-mail, WhatsApp
//! hand-off, dashboards) can react. Delivery is best effort.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::domain::aggregates::{OrderStatus, Position};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal, coupon_id: Option<Uuid> },
    StatusChanged { order_id: Uuid, status: OrderStatus, position: Position },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponEvent {
    Issued { coupon_id: Uuid, user_id: Uuid, code: String },
    Redeemed { coupon_id: Uuid, order_id: Uuid },
    Released { coupon_id: Uuid, order_id: Uuid },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "charada.orders.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "charada.orders.status_changed",
            Self::Coupon(CouponEvent::Issued { .. }) => "charada.coupons.issued",
            Self::Coupon(CouponEvent::Redeemed { .. }) => "charada.coupons.redeemed",
            Self::Coupon(CouponEvent::Released { .. }) => "charada.coupons.released",
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Publishes to NATS when a client is configured; otherwise drops events.
#[derive(Clone, Default)]
pub struct NatsPublisher { client: Option<async_nats::Client> }

impl NatsPublisher {
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::default() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "connected to NATS");
                Self { client: Some(client) }
            }
            Err(err) => {
                tracing::warn!(%url, error = %err, "NATS unavailable, domain events will be dropped");
                Self::default()
            }
        }
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.client else { return };
        let subject = event.subject();
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(subject, error = %err, "failed to encode domain event");
                return;
            }
        };
        if let Err(err) = client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(subject, error = %err, "failed to publish domain event");
        }
    }
}

/// Keeps published events in memory.
#[derive(Default)]
pub struct RecordingPublisher { events: Mutex<Vec<DomainEvent>> }

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }
    pub async fn take(&self) -> Vec<DomainEvent> { std::mem::take(&mut *self.events.lock().await) }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) { self.events.lock().await.push(event); }
}
