//! Support ticket (chamado) opened against an order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    #[serde(rename = "pedidoId")]
    pub order_id: Uuid,
    #[serde(rename = "descricao")]
    pub description: String,
    pub whatsapp: String,
    pub email: String,
    #[serde(rename = "dataAbertura")]
    pub opened_at: DateTime<Utc>,
}

impl Ticket {
    pub fn open(order_id: Uuid, description: impl Into<String>, whatsapp: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, description: description.into(), whatsapp: whatsapp.into(),
            email: email.into(), opened_at: Utc::now(),
        }
    }
}
