//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub status: ProductStatus,
    pub category: String,
    pub description: String,
    pub images: Vec<ProductImage>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductStatus {
    #[default]
    #[serde(rename = "Disponível")]
    Available,
    #[serde(rename = "Indisponível")]
    Unavailable,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Available => "Disponível", Self::Unavailable => "Indisponível" }
    }
}

impl FromStr for ProductStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Disponível" => Ok(Self::Available),
            "Indisponível" => Ok(Self::Unavailable),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

/// Where an image's bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductImage {
    Url { id: Uuid, url: String },
    Upload { id: Uuid },
}

impl ProductImage {
    pub fn id(&self) -> Uuid {
        match self { Self::Url { id, .. } | Self::Upload { id } => *id }
    }

    /// Public link for the image; uploads are served by the image endpoint.
    pub fn resolve(&self, base_url: &str) -> String {
        match self {
            Self::Url { url, .. } => url.clone(),
            Self::Upload { id } => format!("{}/imagens/{}", base_url.trim_end_matches('/'), id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self { Self::Url { .. } => "url", Self::Upload { .. } => "upload" }
    }
}

impl Product {
    pub fn create(name: impl Into<String>, price: Decimal, category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.into(), price, status: ProductStatus::Available,
            category: category.into(), description: description.into(), images: vec![], created_at: Utc::now(),
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.images.push(ProductImage::Url { id: Uuid::now_v7(), url: url.into() });
        self
    }

    pub fn image_urls(&self, base_url: &str) -> Vec<String> {
        self.images.iter().map(|i| i.resolve(base_url)).collect()
    }
}
