//! Accounts: signup, login, profile and password upkeep, administrator seeding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::finish;
use crate::auth::{AuthKeys, Identity};
use crate::domain::aggregates::{Role, User};
use crate::store::{Database, StoreError, Transaction};
use crate::{Result, ShopError};

const BAD_LOGIN: &str = "e-mail or password is incorrect";

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[serde(rename = "nome")]
    #[validate(length(min = 3, max = 100, message = "must have between 3 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "must be a valid e-mail address"))]
    pub email: String,
    #[serde(rename = "senha")]
    #[validate(length(min = 8, message = "must have at least 8 characters"))]
    pub password: String,
    #[serde(rename = "dataNascimento", default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "telefone", default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(rename = "senha")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "perfil")]
    pub role: Role,
}

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

async fn register(tx: &mut dyn Transaction, user: &User) -> Result<()> {
    if tx.find_user_by_email(&user.email).await?.is_some() {
        return Err(ShopError::Conflict("e-mail already registered".into()));
    }
    tx.insert_user(user).await?;
    Ok(())
}

/// Registers a customer account. The role is always `Cliente`.
pub async fn signup(db: &dyn Database, keys: &AuthKeys, req: SignupRequest) -> Result<Uuid> {
    req.validate()?;
    let hash = keys.hash_password(&req.password)?;
    let mut user = User::new(req.name.trim(), normalize_email(&req.email), hash, Role::Cliente);
    user.birth_date = req.birth_date;
    user.phone = req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

    let mut tx = db.begin().await?;
    let result = register(tx.as_mut(), &user).await;
    finish(tx, result).await?;
    tracing::info!(user_id = %user.id, "customer registered");
    Ok(user.id)
}

pub async fn login(db: &dyn Database, keys: &AuthKeys, req: LoginRequest) -> Result<LoginResponse> {
    let mut tx = db.begin().await?;
    let found = tx.find_user_by_email(&normalize_email(&req.email)).await.map_err(ShopError::from);
    let user = finish(tx, found).await?.ok_or_else(|| ShopError::InvalidCredential(BAD_LOGIN.into()))?;
    if !keys.verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(ShopError::InvalidCredential(BAD_LOGIN.into()));
    }
    let identity = Identity { user_id: user.id, email: user.email.clone(), role: user.role };
    let token = keys.issue_token(&identity)?;
    Ok(LoginResponse { token, id: user.id, name: user.name, role: user.role })
}

/// Seeds an administrator account.
pub async fn create_admin(db: &dyn Database, keys: &AuthKeys, name: &str, email: &str, password: &str) -> Result<Uuid> {
    let user = User::new(name, normalize_email(email), keys.hash_password(password)?, Role::Admin);
    let mut tx = db.begin().await?;
    let result = register(tx.as_mut(), &user).await;
    finish(tx, result).await?;
    tracing::info!(user_id = %user.id, "administrator created");
    Ok(user.id)
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "perfil")]
    pub role: Role,
    #[serde(rename = "dataNascimento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "telefone")]
    pub phone: Option<String>,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Self { id: u.id, name: u.name, email: u.email, role: u.role, birth_date: u.birth_date, phone: u.phone }
    }
}

/// Absent or blank name and e-mail are left as they are; a blank phone clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(rename = "nome", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "telefone", default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdated {
    #[serde(rename = "atualizado")]
    pub updated: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(rename = "senhaAntiga")]
    pub current: String,
    #[serde(rename = "novaSenha")]
    #[validate(length(min = 8, message = "must have at least 8 characters"))]
    pub new_password: String,
}

fn gone() -> ShopError { ShopError::NotFound("user not found".into()) }

pub async fn get_profile(db: &dyn Database, who: &Identity) -> Result<Profile> {
    let mut tx = db.begin().await?;
    let found = tx.find_user(who.user_id).await.map_err(ShopError::from);
    finish(tx, found).await?.map(Profile::from).ok_or_else(gone)
}

pub async fn update_profile(db: &dyn Database, who: &Identity, req: UpdateProfileRequest) -> Result<ProfileUpdated> {
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Some(name) = name {
        let len = name.chars().count();
        if !(3..=100).contains(&len) {
            return Err(ShopError::BadRequest("name: must have between 3 and 100 characters".into()));
        }
    }
    let email = req.email.as_deref().map(normalize_email).filter(|e| !e.is_empty());
    if let Some(email) = &email {
        if !validator::validate_email(email.as_str()) {
            return Err(ShopError::BadRequest("email: must be a valid e-mail address".into()));
        }
    }
    let phone = req.phone.map(|p| Some(p.trim().to_string()).filter(|p| !p.is_empty()));

    let mut tx = db.begin().await?;
    let result = profile_steps(tx.as_mut(), who.user_id, name, email, phone).await;
    let updated = finish(tx, result).await?;
    tracing::info!(user_id = %who.user_id, updated, "profile update");
    Ok(ProfileUpdated { updated })
}

async fn profile_steps(
    tx: &mut dyn Transaction,
    user_id: Uuid,
    name: Option<&str>,
    email: Option<String>,
    phone: Option<Option<String>>,
) -> Result<bool> {
    let mut user = tx.find_user(user_id).await?.ok_or_else(gone)?;
    let before = (user.name.clone(), user.email.clone(), user.phone.clone());
    if let Some(name) = name {
        user.name = name.to_string();
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(phone) = phone {
        user.phone = phone;
    }
    if before == (user.name.clone(), user.email.clone(), user.phone.clone()) {
        return Ok(false);
    }
    match tx.update_user_profile(&user).await {
        Ok(0) => Err(gone()),
        Ok(_) => Ok(true),
        Err(StoreError::UniqueViolation(_)) => Err(ShopError::Conflict("e-mail already registered".into())),
        Err(e) => Err(e.into()),
    }
}

/// The current password must be supplied; a wrong one is InvalidCredential.
pub async fn change_password(db: &dyn Database, keys: &AuthKeys, who: &Identity, req: ChangePasswordRequest) -> Result<()> {
    req.validate()?;
    let mut tx = db.begin().await?;
    let result = password_steps(tx.as_mut(), keys, who.user_id, &req).await;
    finish(tx, result).await?;
    tracing::info!(user_id = %who.user_id, "password changed");
    Ok(())
}

async fn password_steps(tx: &mut dyn Transaction, keys: &AuthKeys, user_id: Uuid, req: &ChangePasswordRequest) -> Result<()> {
    let user = tx.find_user(user_id).await?.ok_or_else(gone)?;
    if !keys.verify_password(&req.current, &user.password_hash)? {
        return Err(ShopError::InvalidCredential("current password is incorrect".into()));
    }
    let hash = keys.hash_password(&req.new_password)?;
    if tx.set_password_hash(user_id, &hash).await? == 0 {
        return Err(gone());
    }
    Ok(())
}

/// Registered accounts, administrators included. Admin-only.
pub async fn user_total(db: &dyn Database, who: &Identity) -> Result<u64> {
    who.require_admin()?;
    let mut tx = db.begin().await?;
    let total = tx.count_users().await.map_err(ShopError::from);
    finish(tx, total).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Fixture;

    fn signup_req(email: &str) -> SignupRequest {
        SignupRequest {
            name: "Ana Souza".into(),
            email: email.into(),
            password: "segredo123".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 14),
            phone: Some(" 11999990000 ".into()),
        }
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let f = Fixture::new();
        let id = signup(&f.db, &f.keys, signup_req("Ana@Example.com")).await.unwrap();
        let res = login(&f.db, &f.keys, LoginRequest { email: "ana@example.com".into(), password: "segredo123".into() })
            .await
            .unwrap();
        assert_eq!(res.id, id);
        assert_eq!(res.role, Role::Cliente);
        assert_eq!(f.keys.verify(&res.token).unwrap().user_id, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let f = Fixture::new();
        signup(&f.db, &f.keys, signup_req("ana@example.com")).await.unwrap();
        let err = signup(&f.db, &f.keys, signup_req("ANA@example.com")).await.unwrap_err();
        assert!(matches!(err, ShopError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let f = Fixture::new();
        let mut req = signup_req("not-an-email");
        req.password = "short".into();
        let err = signup(&f.db, &f.keys, req).await.unwrap_err();
        let ShopError::BadRequest(message) = err else { panic!("expected BadRequest") };
        assert!(message.contains("email"));
        assert!(message.contains("password"));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let f = Fixture::new();
        signup(&f.db, &f.keys, signup_req("ana@example.com")).await.unwrap();
        let wrong = login(&f.db, &f.keys, LoginRequest { email: "ana@example.com".into(), password: "errada1234".into() }).await;
        let unknown = login(&f.db, &f.keys, LoginRequest { email: "bia@example.com".into(), password: "segredo123".into() }).await;
        match (wrong, unknown) {
            (Err(ShopError::InvalidCredential(a)), Err(ShopError::InvalidCredential(b))) => assert_eq!(a, b),
            other => panic!("unexpected {other:?}"),
        }
    }

    async fn signed_up(f: &Fixture, email: &str) -> Identity {
        let id = signup(&f.db, &f.keys, signup_req(email)).await.unwrap();
        Identity { user_id: id, email: email.to_lowercase(), role: Role::Cliente }
    }

    #[tokio::test]
    async fn test_profile_read_and_update() {
        let f = Fixture::new();
        let ana = signed_up(&f, "ana@example.com").await;
        let profile = get_profile(&f.db, &ana).await.unwrap();
        assert_eq!((profile.name.as_str(), profile.phone.as_deref()), ("Ana Souza", Some("11999990000")));
        assert_eq!(profile.birth_date, NaiveDate::from_ymd_opt(1990, 5, 14));

        let req = UpdateProfileRequest { name: Some("Ana Lima".into()), email: Some(" Ana.Lima@Example.com ".into()), phone: Some("  ".into()) };
        assert!(update_profile(&f.db, &ana, req).await.unwrap().updated);
        let profile = get_profile(&f.db, &ana).await.unwrap();
        assert_eq!(profile.name, "Ana Lima");
        assert_eq!(profile.email, "ana.lima@example.com");
        assert_eq!(profile.phone, None);

        let same = UpdateProfileRequest { name: Some("Ana Lima".into()), email: Some(String::new()), phone: None };
        assert!(!update_profile(&f.db, &ana, same).await.unwrap().updated);
    }

    #[tokio::test]
    async fn test_profile_update_rules() {
        let f = Fixture::new();
        let ana = signed_up(&f, "ana@example.com").await;
        signed_up(&f, "bia@example.com").await;

        let taken = UpdateProfileRequest { email: Some("BIA@example.com".into()), ..Default::default() };
        assert!(matches!(update_profile(&f.db, &ana, taken).await, Err(ShopError::Conflict(_))));
        let bad = UpdateProfileRequest { email: Some("sem-arroba".into()), ..Default::default() };
        assert!(matches!(update_profile(&f.db, &ana, bad).await, Err(ShopError::BadRequest(_))));
        let short = UpdateProfileRequest { name: Some("Al".into()), ..Default::default() };
        assert!(matches!(update_profile(&f.db, &ana, short).await, Err(ShopError::BadRequest(_))));

        let ghost = Identity { user_id: Uuid::now_v7(), email: "x@example.com".into(), role: Role::Cliente };
        assert!(matches!(get_profile(&f.db, &ghost).await, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_change_password() {
        let f = Fixture::new();
        let ana = signed_up(&f, "ana@example.com").await;

        let wrong = ChangePasswordRequest { current: "errada1234".into(), new_password: "novasenha1".into() };
        assert!(matches!(change_password(&f.db, &f.keys, &ana, wrong).await, Err(ShopError::InvalidCredential(_))));
        let short = ChangePasswordRequest { current: "segredo123".into(), new_password: "curta".into() };
        assert!(matches!(change_password(&f.db, &f.keys, &ana, short).await, Err(ShopError::BadRequest(_))));

        let ok = ChangePasswordRequest { current: "segredo123".into(), new_password: "novasenha1".into() };
        change_password(&f.db, &f.keys, &ana, ok).await.unwrap();
        let old = login(&f.db, &f.keys, LoginRequest { email: "ana@example.com".into(), password: "segredo123".into() }).await;
        assert!(matches!(old, Err(ShopError::InvalidCredential(_))));
        login(&f.db, &f.keys, LoginRequest { email: "ana@example.com".into(), password: "novasenha1".into() }).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_total() {
        let f = Fixture::new();
        let ana = signed_up(&f, "ana@example.com").await;
        let root = f.user("Root", Role::Admin).await;
        assert_eq!(user_total(&f.db, &root).await.unwrap(), 2);
        assert!(matches!(user_total(&f.db, &ana).await, Err(ShopError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_admin() {
        let f = Fixture::new();
        create_admin(&f.db, &f.keys, "Root", "root@example.com", "segredo123").await.unwrap();
        let res = login(&f.db, &f.keys, LoginRequest { email: "root@example.com".into(), password: "segredo123".into() })
            .await
            .unwrap();
        assert_eq!(res.role, Role::Admin);
    }
}
