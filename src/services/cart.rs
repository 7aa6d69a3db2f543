//! Per-user cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::cart::{merged_quantity, subtotal};
use crate::domain::aggregates::{CartItem, CartLine, QuantityChange};
use crate::domain::value_objects::{Quantity, QuantityError};
use crate::store::{Database, Transaction};
use crate::{Result, ShopError};

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "preco")]
    pub price: Decimal,
    #[serde(rename = "quantidade")]
    pub quantity: Quantity,
    #[serde(rename = "imagens")]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    #[serde(rename = "itens")]
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
}

impl CartView {
    fn new(lines: &[CartLine], base_url: &str) -> Self {
        let items = lines
            .iter()
            .map(|l| CartLineView {
                id: l.product_id,
                name: l.name.clone(),
                price: l.unit_price,
                quantity: l.quantity,
                images: l.images.iter().map(|i| i.resolve(base_url)).collect(),
            })
            .collect();
        Self { items, subtotal: subtotal(lines) }
    }
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    #[serde(rename = "produtoId")]
    pub product_id: Uuid,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
}

fn bad_quantity(err: QuantityError) -> ShopError { ShopError::BadRequest(format!("quantidade: {err}")) }

fn missing_cart() -> ShopError { ShopError::NotFound("cart not found".into()) }

/// A user without a cart has an empty one.
pub async fn fetch_cart(db: &dyn Database, who: &Identity, base_url: &str) -> Result<CartView> {
    let mut tx = db.begin().await?;
    let result = lines_for(tx.as_mut(), who.user_id).await;
    let lines = finish(tx, result).await?;
    Ok(CartView::new(&lines, base_url))
}

pub(crate) async fn lines_for(tx: &mut dyn Transaction, user_id: Uuid) -> Result<Vec<CartLine>> {
    match tx.find_cart(user_id).await? {
        Some(cart_id) => Ok(tx.cart_lines(cart_id).await?),
        None => Ok(Vec::new()),
    }
}

/// Creates the cart on first use; adding a product already present increments its line.
pub async fn add_item(db: &dyn Database, who: &Identity, req: CartItemRequest) -> Result<()> {
    let quantity = Quantity::new(req.quantity).map_err(bad_quantity)?;
    let mut tx = db.begin().await?;
    let result = add_steps(tx.as_mut(), who.user_id, req.product_id, quantity).await;
    finish(tx, result).await?;
    tracing::debug!(user_id = %who.user_id, product_id = %req.product_id, "cart item added");
    Ok(())
}

async fn add_steps(tx: &mut dyn Transaction, user_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<()> {
    if tx.find_product(product_id).await?.is_none() {
        return Err(ShopError::NotFound("product not found".into()));
    }
    let cart_id = match tx.find_cart(user_id).await? {
        Some(id) => id,
        None => {
            let id = Uuid::now_v7();
            tx.insert_cart(id, user_id).await?;
            id
        }
    };
    match tx.find_cart_item(cart_id, product_id).await? {
        Some(item) => {
            let merged = merged_quantity(Some(item.quantity), quantity).map_err(bad_quantity)?;
            tx.set_cart_item_quantity(cart_id, product_id, merged).await?;
        }
        None => {
            tx.insert_cart_item(&CartItem { id: Uuid::now_v7(), cart_id, product_id, quantity }).await?;
        }
    }
    Ok(())
}

/// Sets an explicit quantity on an existing line; zero removes it.
pub async fn update_quantity(db: &dyn Database, who: &Identity, req: CartItemRequest) -> Result<()> {
    let change = QuantityChange::from_requested(req.quantity).map_err(bad_quantity)?;
    let mut tx = db.begin().await?;
    let result = update_steps(tx.as_mut(), who.user_id, req.product_id, change).await;
    finish(tx, result).await
}

async fn update_steps(tx: &mut dyn Transaction, user_id: Uuid, product_id: Uuid, change: QuantityChange) -> Result<()> {
    let cart_id = tx.find_cart(user_id).await?.ok_or_else(missing_cart)?;
    let touched = match change {
        QuantityChange::Set(q) => tx.set_cart_item_quantity(cart_id, product_id, q).await?,
        QuantityChange::Remove => tx.delete_cart_item(cart_id, product_id).await?,
    };
    if touched == 0 {
        return Err(ShopError::NotFound("item not in cart".into()));
    }
    Ok(())
}

pub async fn remove_item(db: &dyn Database, who: &Identity, product_id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let result = update_steps(tx.as_mut(), who.user_id, product_id, QuantityChange::Remove).await;
    finish(tx, result).await
}

/// Idempotent: clearing an empty or missing cart succeeds.
pub async fn clear_cart(db: &dyn Database, who: &Identity) -> Result<()> {
    let mut tx = db.begin().await?;
    let result = clear_steps(tx.as_mut(), who.user_id).await;
    finish(tx, result).await
}

pub(crate) async fn clear_steps(tx: &mut dyn Transaction, user_id: Uuid) -> Result<()> {
    if let Some(cart_id) = tx.find_cart(user_id).await? {
        let removed = tx.clear_cart(cart_id).await?;
        tracing::debug!(%user_id, removed, "cart cleared");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::services::testing::{Fixture, BASE_URL};

    fn req(product_id: Uuid, quantity: i64) -> CartItemRequest { CartItemRequest { product_id, quantity } }

    #[tokio::test]
    async fn test_fetch_without_cart_is_empty() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let cart = fetch_cart(&f.db, &ana, BASE_URL).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_adding_twice_merges_into_one_line() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, req(p1, 1)).await.unwrap();
        add_item(&f.db, &ana, req(p1, 1)).await.unwrap();
        let cart = fetch_cart(&f.db, &ana, BASE_URL).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity.value(), 2);
        assert_eq!(cart.subtotal, Decimal::new(10000, 2));
    }

    #[tokio::test]
    async fn test_add_rules() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        assert!(matches!(add_item(&f.db, &ana, req(p1, 0)).await, Err(ShopError::BadRequest(_))));
        assert!(matches!(add_item(&f.db, &ana, req(Uuid::now_v7(), 1)).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        let p2 = f.product("Enigma Kit", 1999).await;
        assert!(matches!(update_quantity(&f.db, &ana, req(p1, 3)).await, Err(ShopError::NotFound(_))));

        add_item(&f.db, &ana, req(p1, 1)).await.unwrap();
        add_item(&f.db, &ana, req(p2, 1)).await.unwrap();
        update_quantity(&f.db, &ana, req(p1, 3)).await.unwrap();
        update_quantity(&f.db, &ana, req(p2, 0)).await.unwrap();
        let cart = fetch_cart(&f.db, &ana, BASE_URL).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity.value(), 3);

        assert!(matches!(update_quantity(&f.db, &ana, req(p1, -2)).await, Err(ShopError::BadRequest(_))));
        assert!(matches!(remove_item(&f.db, &ana, p2).await, Err(ShopError::NotFound(_))));
        remove_item(&f.db, &ana, p1).await.unwrap();
        assert!(fetch_cart(&f.db, &ana, BASE_URL).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        clear_cart(&f.db, &ana).await.unwrap(); // no cart yet

        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, req(p1, 2)).await.unwrap();
        clear_cart(&f.db, &ana).await.unwrap();
        assert!(fetch_cart(&f.db, &ana, BASE_URL).await.unwrap().items.is_empty());
        clear_cart(&f.db, &ana).await.unwrap();
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, req(p1, 1)).await.unwrap();
        assert!(fetch_cart(&f.db, &bia, BASE_URL).await.unwrap().items.is_empty());
        assert!(matches!(remove_item(&f.db, &bia, p1).await, Err(ShopError::NotFound(_))));
    }
}
