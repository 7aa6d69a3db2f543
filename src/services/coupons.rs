//! Coupon application and birthday issuance.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::lines_for;
use super::finish;
use crate::auth::Identity;
use crate::domain::aggregates::cart::subtotal;
use crate::domain::aggregates::{Coupon, CouponKind, DiscountQuote, Ineligible, Role};
use crate::domain::events::{CouponEvent, DomainEvent, EventPublisher};
use crate::domain::value_objects::{CouponCode, MonthYear};
use crate::store::{Database, Transaction};
use crate::{Result, ShopError};

/// Attempts at finding an unused birthday code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    #[serde(rename = "codigoCupom")]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueCouponRequest {
    #[serde(rename = "usuarioId")]
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignRequest {
    #[serde(rename = "mesAno", default)]
    pub month_year: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuedCoupon {
    #[serde(rename = "cupomId")]
    pub coupon_id: Uuid,
    #[serde(rename = "codigo")]
    pub code: CouponCode,
}

#[derive(Debug, Serialize)]
pub struct CampaignReport {
    #[serde(rename = "mesAno")]
    pub month_year: String,
    pub total: usize,
    /// E-mail addresses that received a coupon.
    #[serde(rename = "enviados")]
    pub sent_to: Vec<String>,
}

impl From<Ineligible> for ShopError {
    fn from(reason: Ineligible) -> Self {
        match reason {
            Ineligible::AlreadyUsed => Self::Conflict("coupon has already been used".into()),
            Ineligible::LinkedToOrder => Self::Conflict("coupon is already linked to an order".into()),
            Ineligible::NotOwner => Self::Forbidden("coupon belongs to another user".into()),
        }
    }
}

/// Quotes the discount a coupon gives on the caller's current cart.
pub async fn apply_coupon(db: &dyn Database, who: &Identity, req: ApplyCouponRequest) -> Result<DiscountQuote> {
    let code = CouponCode::parse(&req.code).map_err(|e| ShopError::BadRequest(e.to_string()))?;
    let mut tx = db.begin().await?;
    let result = apply_steps(tx.as_mut(), who.user_id, &code).await;
    let quote = finish(tx, result).await?;
    tracing::info!(user_id = %who.user_id, coupon_id = %quote.coupon_id, discount = %quote.discount, "coupon applied");
    Ok(quote)
}

async fn apply_steps(tx: &mut dyn Transaction, user_id: Uuid, code: &CouponCode) -> Result<DiscountQuote> {
    let coupon = tx
        .find_coupon_by_code(code)
        .await?
        .ok_or_else(|| ShopError::NotFound("coupon not found or invalid".into()))?;
    let linked = tx.order_for_coupon(coupon.id).await?;
    coupon.check_redeemable(user_id, linked)?;

    let lines = lines_for(tx, user_id).await?;
    if lines.is_empty() {
        return Err(ShopError::BadRequest("cart has no items".into()));
    }
    Ok(coupon.quote(subtotal(&lines)))
}

/// Generates a fresh birthday code, retrying on collision a bounded number of times.
pub(crate) async fn issue_birthday(
    tx: &mut dyn Transaction,
    owner_id: Uuid,
    today: NaiveDate,
    mut next_code: impl FnMut() -> CouponCode + Send,
) -> Result<Coupon> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = next_code();
        if tx.coupon_code_exists(&code).await? {
            tracing::debug!(attempt, code = %code, "coupon code collision");
            continue;
        }
        let coupon = Coupon::birthday(owner_id, code, today);
        tx.insert_coupon(&coupon).await?;
        return Ok(coupon);
    }
    Err(ShopError::Internal(format!("no free coupon code after {MAX_CODE_ATTEMPTS} attempts")))
}

async fn announce(events: &dyn EventPublisher, coupon: &Coupon) {
    events
        .publish(DomainEvent::Coupon(CouponEvent::Issued {
            coupon_id: coupon.id,
            user_id: coupon.owner_id,
            code: coupon.code.to_string(),
        }))
        .await;
}

/// Issues one birthday coupon to a customer, at most one per day.
pub async fn issue_birthday_coupon(
    db: &dyn Database,
    events: &dyn EventPublisher,
    who: &Identity,
    req: IssueCouponRequest,
) -> Result<IssuedCoupon> {
    who.require_admin()?;
    let today = Utc::now().date_naive();
    let mut tx = db.begin().await?;
    let result = issue_steps(tx.as_mut(), req.user_id, today).await;
    let coupon = finish(tx, result).await?;
    tracing::info!(coupon_id = %coupon.id, user_id = %coupon.owner_id, "birthday coupon issued");
    announce(events, &coupon).await;
    Ok(IssuedCoupon { coupon_id: coupon.id, code: coupon.code })
}

async fn issue_steps(tx: &mut dyn Transaction, user_id: Uuid, today: NaiveDate) -> Result<Coupon> {
    match tx.find_user(user_id).await? {
        Some(user) if user.role == Role::Cliente => {}
        _ => return Err(ShopError::NotFound("customer not found".into())),
    }
    if tx.coupon_issued_on(user_id, CouponKind::BIRTHDAY_TAG, today).await? {
        return Err(ShopError::Conflict("a birthday coupon was already issued to this customer today".into()));
    }
    issue_birthday(tx, user_id, today, || CouponCode::birthday(today)).await
}

/// Issues a birthday coupon to every customer born in the month. Runs once per month.
pub async fn run_birthday_campaign(
    db: &dyn Database,
    events: &dyn EventPublisher,
    who: &Identity,
    req: CampaignRequest,
) -> Result<CampaignReport> {
    who.require_admin()?;
    let today = Utc::now().date_naive();
    let month = match req.month_year.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => MonthYear::parse(raw).map_err(|e| ShopError::BadRequest(format!("mesAno: {e}")))?,
        None => MonthYear::of(today),
    };

    let mut tx = db.begin().await?;
    let result = campaign_steps(tx.as_mut(), month, today).await;
    let issued = finish(tx, result).await?;
    tracing::info!(month = %month, total = issued.len(), "birthday campaign completed");

    for (coupon, _) in &issued {
        announce(events, coupon).await;
    }
    Ok(CampaignReport {
        month_year: month.to_string(),
        total: issued.len(),
        sent_to: issued.into_iter().map(|(_, email)| email).collect(),
    })
}

async fn campaign_steps(tx: &mut dyn Transaction, month: MonthYear, today: NaiveDate) -> Result<Vec<(Coupon, String)>> {
    if tx.birthday_run_recorded(month).await? {
        return Err(ShopError::Conflict(format!("birthday coupons for {month} were already sent")));
    }
    let mut issued = Vec::new();
    for user in tx.clients_born_in(month.month()).await? {
        let coupon = issue_birthday(tx, user.id, today, || CouponCode::birthday(today)).await?;
        issued.push((coupon, user.email));
    }
    tx.record_birthday_run(month, Utc::now()).await?;
    Ok(issued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::User;
    use crate::services::cart::{add_item, CartItemRequest};
    use crate::services::testing::Fixture;
    use rust_decimal::Decimal;

    fn apply_req(code: &CouponCode) -> ApplyCouponRequest { ApplyCouponRequest { code: code.to_string() } }

    #[tokio::test]
    async fn test_birthday_discount_on_cart() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let p1 = f.product("Charada Box", 5000).await;
        add_item(&f.db, &ana, CartItemRequest { product_id: p1, quantity: 1 }).await.unwrap();
        let coupon = f.coupon(ana.user_id).await;

        let quote = apply_coupon(&f.db, &ana, apply_req(&coupon.code)).await.unwrap();
        assert_eq!(quote.discount, Decimal::new(500, 2));
        assert_eq!(quote.subtotal, Decimal::new(5000, 2));
        assert_eq!(quote.coupon_id, coupon.id);
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let err = apply_coupon(&f.db, &ana, ApplyCouponRequest { code: "NOPE-0000".into() }).await.unwrap_err();
        assert!(matches!(err, ShopError::NotFound(m) if m.contains("invalid")));
    }

    #[tokio::test]
    async fn test_used_coupon_conflicts_for_anyone() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        let mut tx = f.db.begin().await.unwrap();
        tx.mark_coupon_used(coupon.id, ana.user_id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        for who in [&ana, &bia] {
            let err = apply_coupon(&f.db, who, apply_req(&coupon.code)).await.unwrap_err();
            assert!(matches!(err, ShopError::Conflict(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_foreign_coupon_forbidden_and_empty_cart() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let bia = f.user("Bia", Role::Cliente).await;
        let coupon = f.coupon(ana.user_id).await;
        assert!(matches!(apply_coupon(&f.db, &bia, apply_req(&coupon.code)).await, Err(ShopError::Forbidden(_))));
        assert!(matches!(apply_coupon(&f.db, &ana, apply_req(&coupon.code)).await, Err(ShopError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_code_generation_is_bounded() {
        let f = Fixture::new();
        let ana = f.user("Ana", Role::Cliente).await;
        let today = Utc::now().date_naive();
        let taken = CouponCode::birthday_with_suffix(today, 7);
        let mut tx = f.db.begin().await.unwrap();
        issue_birthday(tx.as_mut(), ana.user_id, today, || taken.clone()).await.unwrap();

        let mut calls = 0;
        let err = issue_birthday(tx.as_mut(), ana.user_id, today, || {
            calls += 1;
            taken.clone()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShopError::Internal(_)));
        assert_eq!(calls, MAX_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_manual_issue() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let ana = f.user("Ana", Role::Cliente).await;

        let issued = issue_birthday_coupon(&f.db, &f.events, &admin, IssueCouponRequest { user_id: ana.user_id }).await.unwrap();
        assert!(issued.code.as_str().starts_with("ANIV-"));
        assert_eq!(f.events.take().await.len(), 1);

        let again = issue_birthday_coupon(&f.db, &f.events, &admin, IssueCouponRequest { user_id: ana.user_id }).await;
        assert!(matches!(again, Err(ShopError::Conflict(_))));
        let admin_target = issue_birthday_coupon(&f.db, &f.events, &admin, IssueCouponRequest { user_id: admin.user_id }).await;
        assert!(matches!(admin_target, Err(ShopError::NotFound(_))));
        let by_client = issue_birthday_coupon(&f.db, &f.events, &ana, IssueCouponRequest { user_id: ana.user_id }).await;
        assert!(matches!(by_client, Err(ShopError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_campaign_runs_once_per_month() {
        let f = Fixture::new();
        let admin = f.user("Root", Role::Admin).await;
        let mut tx = f.db.begin().await.unwrap();
        for (name, month) in [("Ana", 7), ("Bia", 7), ("Caio", 8)] {
            let mut user = User::new(name, format!("{}@example.com", name.to_lowercase()), "x", Role::Cliente);
            user.birth_date = NaiveDate::from_ymd_opt(1995, month, 10);
            tx.insert_user(&user).await.unwrap();
        }
        tx.commit().await.unwrap();

        let req = || CampaignRequest { month_year: Some("2025-07".into()) };
        let report = run_birthday_campaign(&f.db, &f.events, &admin, req()).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.month_year, "2025-07");
        assert!(report.sent_to.contains(&"ana@example.com".to_string()));
        assert_eq!(f.events.take().await.len(), 2);

        let again = run_birthday_campaign(&f.db, &f.events, &admin, req()).await;
        assert!(matches!(again, Err(ShopError::Conflict(_))));
        let bad = run_birthday_campaign(&f.db, &f.events, &admin, CampaignRequest { month_year: Some("julho".into()) }).await;
        assert!(matches!(bad, Err(ShopError::BadRequest(_))));
    }
}
