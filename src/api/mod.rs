//! HTTP surface.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::AuthKeys;
use crate::domain::events::EventPublisher;
use crate::store::Database;
use crate::ShopError;

mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub events: Arc<dyn EventPublisher>,
    pub auth: Arc<AuthKeys>,
    /// Public base URL, used for uploaded image links.
    pub base_url: Arc<str>,
}

impl FromRef<AppState> for Arc<AuthKeys> {
    fn from_ref(state: &AppState) -> Self { Arc::clone(&state.auth) }
}

pub fn router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/signup", post(signup))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/users/me", get(get_profile).put(update_profile))
        .route("/api/v1/users/me/password", put(change_password))
        .route("/api/v1/users/total", get(user_total))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_cart_item).put(update_cart_item))
        .route("/api/v1/cart/items/:product_id", delete(remove_cart_item))
        .route("/api/v1/cart/coupon", post(apply_coupon))
        .route("/api/v1/cart/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order).put(update_order))
        .route("/api/v1/orders/:id/seen", post(mark_order_seen))
        .route("/api/v1/orders/:id/ticket", get(order_ticket))
        .route("/api/v1/sales/total", get(sales_total))
        .route("/api/v1/sales/monthly", get(monthly_sales))
        .route("/api/v1/admin/coupons/birthday", post(issue_birthday_coupon))
        .route("/api/v1/admin/coupons/birthday/run", post(run_birthday_campaign))
        .route("/api/v1/tickets", get(list_tickets).post(open_ticket))
        .route("/api/v1/tickets/:id", get(get_ticket).delete(delete_ticket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl ShopError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "success": false, "message": message }))).into_response()
    }
}

/// JSON body whose rejections use the service's error shape.
pub struct Body<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ShopError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}
