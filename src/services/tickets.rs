//! Support tickets (chamados) opened against orders.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::Ticket;
use crate::store::{Database, Transaction};
use crate::{Result, ShopError};

#[derive(Debug, Deserialize, Validate)]
pub struct OpenTicketRequest {
    #[serde(rename = "pedidoId")]
    pub order_id: Option<Uuid>,
    #[serde(rename = "descricao", default)]
    #[validate(length(min = 1, message = "is required"))]
    pub description: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub whatsapp: String,
    #[serde(default)]
    #[validate(email(message = "must be a valid e-mail address"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TicketOpened {
    pub id: Uuid,
}

fn not_found() -> ShopError { ShopError::NotFound("ticket not found".into()) }

pub async fn open_ticket(db: &dyn Database, who: &Identity, req: OpenTicketRequest) -> Result<TicketOpened> {
    req.validate()?;
    let order_id = req.order_id.ok_or_else(|| ShopError::BadRequest("order_id: is required".into()))?;
    if req.description.trim().is_empty() || req.whatsapp.trim().is_empty() {
        return Err(ShopError::BadRequest("description and whatsapp must not be blank".into()));
    }
    let ticket = Ticket::open(order_id, req.description.trim(), req.whatsapp.trim(), req.email.trim());

    let mut tx = db.begin().await?;
    let result = open_steps(tx.as_mut(), who, &ticket).await;
    finish(tx, result).await?;
    tracing::info!(ticket_id = %ticket.id, %order_id, user_id = %who.user_id, "ticket opened");
    Ok(TicketOpened { id: ticket.id })
}

async fn open_steps(tx: &mut dyn Transaction, who: &Identity, ticket: &Ticket) -> Result<()> {
    let order = tx.find_order(ticket.order_id).await?.ok_or_else(|| ShopError::NotFound("order not found".into()))?;
    who.require_owner_or_admin(order.user_id)?;
    tx.insert_ticket(ticket).await?;
    Ok(())
}

pub async fn list_tickets(db: &dyn Database, who: &Identity) -> Result<Vec<Ticket>> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let listed = tx.list_tickets().await.map_err(ShopError::from);
    finish(tx, listed).await
}

pub async fn get_ticket(db: &dyn Database, who: &Identity, id: Uuid) -> Result<Ticket> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let found = tx.find_ticket(id).await.map_err(ShopError::from);
    finish(tx, found).await?.ok_or_else(not_found)
}

pub async fn delete_ticket(db: &dyn Database, who: &Identity, id: Uuid) -> Result<()> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let result = match tx.delete_ticket(id).await {
        Ok(0) => Err(not_found()),
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    };
    finish(tx, result).await?;
    tracing::info!(ticket_id = %id, admin_id = %who.user_id, "ticket deleted");
    Ok(())
}

/// The ticket opened for an order, visible to its owner and administrators.
pub async fn ticket_for_order(db: &dyn Database, who: &Identity, order_id: Uuid) -> Result<Ticket> {
    let mut tx = db.begin().await?;
    let result = for_order_steps(tx.as_mut(), who, order_id).await;
    finish(tx, result).await
}

async fn for_order_steps(tx: &mut dyn Transaction, who: &Identity, order_id: Uuid) -> Result<Ticket> {
    let order = tx.find_order(order_id).await?.ok_or_else(|| ShopError::NotFound("order not found".into()))?;
    who.require_owner_or_admin(order.user_id)?;
    tx.find_ticket_for_order(order_id).await?.ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Order, Role};
    use crate::services::testing::Fixture;
    use chrono::Utc;
    use rust_decimal::Decimal;

    async fn order_for(f: &Fixture, who: &Identity) -> Uuid {
        let order = Order::place(who.user_id, Decimal::new(4500, 2), None, Utc::now().date_naive());
        let mut tx = f.db.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order.id
    }

    fn request(order_id: Option<Uuid>) -> OpenTicketRequest {
        OpenTicketRequest {
            order_id,
            description: "Caixa chegou amassada".into(),
            whatsapp: "11999990000".into(),
            email: "ana@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_ticket_lifecycle() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;
        let order_id = order_for(&f, &ana).await;

        let opened = open_ticket(&f.db, &ana, request(Some(order_id))).await.unwrap();
        assert_eq!(ticket_for_order(&f.db, &ana, order_id).await.unwrap().id, opened.id);
        assert_eq!(list_tickets(&f.db, &admin).await.unwrap().len(), 1);
        assert_eq!(get_ticket(&f.db, &admin, opened.id).await.unwrap().order_id, order_id);

        delete_ticket(&f.db, &admin, opened.id).await.unwrap();
        assert!(matches!(get_ticket(&f.db, &admin, opened.id).await, Err(ShopError::NotFound(_))));
        assert!(matches!(delete_ticket(&f.db, &admin, opened.id).await, Err(ShopError::NotFound(_))));
        assert!(matches!(ticket_for_order(&f.db, &ana, order_id).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_open_rules() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let order_id = order_for(&f, &ana).await;

        assert!(matches!(open_ticket(&f.db, &ana, request(None)).await, Err(ShopError::BadRequest(_))));
        let mut blank = request(Some(order_id));
        blank.description = String::new();
        assert!(matches!(open_ticket(&f.db, &ana, blank).await, Err(ShopError::BadRequest(_))));
        assert!(matches!(open_ticket(&f.db, &ana, request(Some(Uuid::now_v7()))).await, Err(ShopError::NotFound(_))));
        assert!(matches!(open_ticket(&f.db, &bia, request(Some(order_id))).await, Err(ShopError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_admin_only_reads() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        assert!(matches!(list_tickets(&f.db, &ana).await, Err(ShopError::Forbidden(_))));
        assert!(matches!(get_ticket(&f.db, &ana, Uuid::now_v7()).await, Err(ShopError::Forbidden(_))));
        assert!(matches!(delete_ticket(&f.db, &ana, Uuid::now_v7()).await, Err(ShopError::Forbidden(_))));
    }
}
