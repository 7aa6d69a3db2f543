use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{AppState, Body};
use crate::auth::Identity;
use crate::services::{cart, catalog, checkout as checkout_svc, coupons, orders, tickets, users};
use crate::Result;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "charada-shop" }))
}

// Auth

pub async fn signup(State(s): State<AppState>, Body(req): Body<users::SignupRequest>) -> Result<impl IntoResponse> {
    let id = users::signup(s.db.as_ref(), &s.auth, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn login(State(s): State<AppState>, Body(req): Body<users::LoginRequest>) -> Result<impl IntoResponse> {
    Ok(Json(users::login(s.db.as_ref(), &s.auth, req).await?))
}

pub async fn get_profile(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    Ok(Json(users::get_profile(s.db.as_ref(), &who).await?))
}

pub async fn update_profile(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<users::UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(users::update_profile(s.db.as_ref(), &who, req).await?))
}

pub async fn change_password(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<users::ChangePasswordRequest>,
) -> Result<StatusCode> {
    users::change_password(s.db.as_ref(), &s.auth, &who, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn user_total(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    let total = users::user_total(s.db.as_ref(), &who).await?;
    Ok(Json(json!({ "total": total })))
}

// Catalog

pub async fn list_products(State(s): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(catalog::list_products(s.db.as_ref(), &s.base_url).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    Ok(Json(catalog::get_product(s.db.as_ref(), &s.base_url, id).await?))
}

pub async fn create_product(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<catalog::CreateProductRequest>,
) -> Result<impl IntoResponse> {
    let id = catalog::create_product(s.db.as_ref(), &who, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn update_product(
    State(s): State<AppState>,
    who: Identity,
    Path(id): Path<Uuid>,
    Body(req): Body<catalog::UpdateProductRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(catalog::update_product(s.db.as_ref(), &who, &s.base_url, id, req).await?))
}

pub async fn delete_product(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_product(s.db.as_ref(), &who, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Cart

pub async fn get_cart(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    Ok(Json(cart::fetch_cart(s.db.as_ref(), &who, &s.base_url).await?))
}

pub async fn clear_cart(State(s): State<AppState>, who: Identity) -> Result<StatusCode> {
    cart::clear_cart(s.db.as_ref(), &who).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_cart_item(State(s): State<AppState>, who: Identity, Body(req): Body<cart::CartItemRequest>) -> Result<StatusCode> {
    cart::add_item(s.db.as_ref(), &who, req).await?;
    Ok(StatusCode::CREATED)
}

pub async fn update_cart_item(State(s): State<AppState>, who: Identity, Body(req): Body<cart::CartItemRequest>) -> Result<StatusCode> {
    cart::update_quantity(s.db.as_ref(), &who, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_cart_item(State(s): State<AppState>, who: Identity, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    cart::remove_item(s.db.as_ref(), &who, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_coupon(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<coupons::ApplyCouponRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(coupons::apply_coupon(s.db.as_ref(), &who, req).await?))
}

pub async fn checkout(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<checkout_svc::CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let receipt = checkout_svc::checkout(s.db.as_ref(), s.events.as_ref(), &who, req).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// Orders

pub async fn list_orders(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    Ok(Json(orders::list_orders(s.db.as_ref(), &who).await?))
}

pub async fn get_order(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    Ok(Json(orders::get_order(s.db.as_ref(), &who, id).await?))
}

pub async fn update_order(
    State(s): State<AppState>,
    who: Identity,
    Path(id): Path<Uuid>,
    Body(req): Body<orders::UpdateOrderRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(orders::update_order_status(s.db.as_ref(), s.events.as_ref(), &who, id, req).await?))
}

pub async fn mark_order_seen(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<StatusCode> {
    orders::mark_seen(s.db.as_ref(), &who, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn order_ticket(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    Ok(Json(tickets::ticket_for_order(s.db.as_ref(), &who, id).await?))
}

pub async fn sales_total(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    let total = orders::sales_total(s.db.as_ref(), &who).await?;
    Ok(Json(json!({ "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    ano: Option<i32>,
}

pub async fn monthly_sales(State(s): State<AppState>, who: Identity, Query(q): Query<YearQuery>) -> Result<impl IntoResponse> {
    let year = q.ano.unwrap_or_else(|| Utc::now().year());
    Ok(Json(orders::monthly_sales(s.db.as_ref(), &who, year).await?))
}

// Coupons (admin)

pub async fn issue_birthday_coupon(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<coupons::IssueCouponRequest>,
) -> Result<impl IntoResponse> {
    let issued = coupons::issue_birthday_coupon(s.db.as_ref(), s.events.as_ref(), &who, req).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

pub async fn run_birthday_campaign(
    State(s): State<AppState>,
    who: Identity,
    Query(req): Query<coupons::CampaignRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(coupons::run_birthday_campaign(s.db.as_ref(), s.events.as_ref(), &who, req).await?))
}

// Tickets

pub async fn list_tickets(State(s): State<AppState>, who: Identity) -> Result<impl IntoResponse> {
    Ok(Json(tickets::list_tickets(s.db.as_ref(), &who).await?))
}

pub async fn open_ticket(
    State(s): State<AppState>,
    who: Identity,
    Body(req): Body<tickets::OpenTicketRequest>,
) -> Result<impl IntoResponse> {
    let opened = tickets::open_ticket(s.db.as_ref(), &who, req).await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

pub async fn get_ticket(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    Ok(Json(tickets::get_ticket(s.db.as_ref(), &who, id).await?))
}

pub async fn delete_ticket(State(s): State<AppState>, who: Identity, Path(id): Path<Uuid>) -> Result<StatusCode> {
    tickets::delete_ticket(s.db.as_ref(), &who, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
