//! Charada Shop
//!
//! Cart, checkout and order-lifecycle service behind the Charada storefront.
//!
//! ## Features
//! - Bearer-token gate with canonical roles
//! - Per-user carts with product snapshots
//! - Birthday coupons and coupon application
//! - Atomic checkout into an order snapshot
//! - Admin-driven order status/position state machine with coupon reconciliation
//! - Support tickets linked to orders

use thiserror::Error;

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod services;
pub mod store;

use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ShopError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => Self::Conflict(format!("{what} already exists")),
            StoreError::ForeignKeyViolation(what) => Self::BadRequest(format!("invalid reference: {what}")),
            other => Self::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|e| e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string))
                    .collect();
                format!("{field}: {}", reasons.join(", "))
            })
            .collect();
        fields.sort();
        Self::BadRequest(fields.join("; "))
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
