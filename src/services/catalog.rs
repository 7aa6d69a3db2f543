//! Product catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::{Product, ProductImage, ProductStatus};
use crate::domain::value_objects::round_money;
use crate::store::{Database, StoreError, Transaction};
use crate::{Result, ShopError};

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "preco")]
    pub price: Decimal,
    pub status: ProductStatus,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "imagens")]
    pub images: Vec<String>,
    /// Same order as `images`; an edit keeps images by these ids.
    #[serde(rename = "imagensIds")]
    pub image_ids: Vec<Uuid>,
}

impl ProductView {
    pub fn new(product: &Product, base_url: &str) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            status: product.status,
            category: product.category.clone(),
            description: product.description.clone(),
            images: product.image_urls(base_url),
            image_ids: product.images.iter().map(ProductImage::id).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[serde(rename = "nome")]
    #[validate(length(min = 3, max = 100, message = "must have between 3 and 100 characters"))]
    pub name: String,
    #[serde(rename = "preco")]
    pub price: Decimal,
    #[serde(rename = "categoria")]
    #[validate(length(min = 1, message = "is required"))]
    pub category: String,
    #[serde(rename = "descricao")]
    #[validate(length(min = 1, message = "is required"))]
    pub description: String,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(rename = "imagens", default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[serde(rename = "nome")]
    #[validate(length(min = 3, max = 100, message = "must have between 3 and 100 characters"))]
    pub name: String,
    #[serde(rename = "preco")]
    pub price: Decimal,
    #[serde(rename = "categoria")]
    #[validate(length(min = 1, message = "is required"))]
    pub category: String,
    #[serde(rename = "descricao")]
    #[validate(length(min = 1, message = "is required"))]
    pub description: String,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    /// Current images to keep; every other current image is removed.
    #[serde(rename = "imagensExistentes", default)]
    pub keep_images: Vec<Uuid>,
    /// New external image URLs.
    #[serde(rename = "imagens", default)]
    pub images: Vec<String>,
}

fn check_price(price: Decimal) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(ShopError::BadRequest("price: must be greater than zero".into()));
    }
    Ok(round_money(price))
}

pub async fn list_products(db: &dyn Database, base_url: &str) -> Result<Vec<ProductView>> {
    let mut tx = db.begin().await?;
    let listed = tx.list_products().await.map_err(ShopError::from);
    let products = finish(tx, listed).await?;
    Ok(products.iter().map(|p| ProductView::new(p, base_url)).collect())
}

pub async fn get_product(db: &dyn Database, base_url: &str, id: Uuid) -> Result<ProductView> {
    let mut tx = db.begin().await?;
    let found = tx.find_product(id).await.map_err(ShopError::from);
    finish(tx, found)
        .await?
        .map(|p| ProductView::new(&p, base_url))
        .ok_or_else(|| ShopError::NotFound("product not found".into()))
}

pub async fn create_product(db: &dyn Database, who: &Identity, req: CreateProductRequest) -> Result<Uuid> {
    who.require_admin()?;
    req.validate()?;
    let price = check_price(req.price)?;
    let mut product = Product::create(req.name.trim(), price, req.category.trim(), req.description.trim());
    product.status = req.status.unwrap_or_default();
    for url in req.images.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        product = product.with_image_url(url);
    }

    let mut tx = db.begin().await?;
    let result = insert(tx.as_mut(), &product).await;
    finish(tx, result).await?;
    tracing::info!(product_id = %product.id, admin_id = %who.user_id, "product created");
    Ok(product.id)
}

async fn insert(tx: &mut dyn Transaction, product: &Product) -> Result<()> {
    match tx.insert_product(product).await {
        Err(StoreError::UniqueViolation(_)) => Err(ShopError::Conflict(format!("a product named '{}' already exists", product.name))),
        other => Ok(other?),
    }
}

/// Rewrites an existing product. Status falls back to `Disponível` when omitted.
pub async fn update_product(
    db: &dyn Database,
    who: &Identity,
    base_url: &str,
    id: Uuid,
    req: UpdateProductRequest,
) -> Result<ProductView> {
    who.require_admin()?;
    req.validate()?;
    let price = check_price(req.price)?;

    let mut tx = db.begin().await?;
    let result = update_steps(tx.as_mut(), id, price, req).await;
    let product = finish(tx, result).await?;
    tracing::info!(product_id = %id, admin_id = %who.user_id, images = product.images.len(), "product updated");
    Ok(ProductView::new(&product, base_url))
}

async fn update_steps(tx: &mut dyn Transaction, id: Uuid, price: Decimal, req: UpdateProductRequest) -> Result<Product> {
    let mut product = tx.find_product(id).await?.ok_or_else(|| ShopError::NotFound("product not found".into()))?;
    product.name = req.name.trim().to_string();
    product.price = price;
    product.category = req.category.trim().to_string();
    product.description = req.description.trim().to_string();
    product.status = req.status.unwrap_or_default();
    product.images.retain(|image| req.keep_images.contains(&image.id()));
    for url in req.images.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        product = product.with_image_url(url);
    }

    match tx.update_product(&product).await {
        Ok(0) => Err(ShopError::NotFound("product not found".into())),
        Ok(_) => Ok(product),
        Err(StoreError::UniqueViolation(_)) => Err(ShopError::Conflict(format!("another product is named '{}'", product.name))),
        Err(e) => Err(e.into()),
    }
}

/// Deletes a product and its images. Products already sold stay.
pub async fn delete_product(db: &dyn Database, who: &Identity, id: Uuid) -> Result<()> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let result = match tx.delete_product(id).await {
        Ok(0) => Err(ShopError::NotFound("product not found".into())),
        Ok(_) => Ok(()),
        Err(StoreError::ForeignKeyViolation(_)) => Err(ShopError::Conflict("product is part of existing orders".into())),
        Err(e) => Err(e.into()),
    };
    finish(tx, result).await?;
    tracing::info!(product_id = %id, admin_id = %who.user_id, "product deleted");
    Ok(())
}
