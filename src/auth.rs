//! Bearer-token gate.
//!
//! Every protected handler receives an [`Identity`] rebuilt from a verified
//! token; nothing the client decodes on its own side is trusted.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::Role;
use crate::{Result, ShopError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub perfil: Role,
    pub exp: usize,
}

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(ShopError::Forbidden("administrator access required".into())) }
    }

    /// Owner of the resource or an administrator.
    pub fn require_owner_or_admin(&self, owner_id: Uuid) -> Result<()> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(ShopError::Forbidden("resource belongs to another user".into()))
        }
    }
}

/// Signing keys and password hashing settings.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
    bcrypt_cost: u32,
}

impl AuthKeys {
    pub fn new(secret: &SecretString, ttl_secs: u64, bcrypt_cost: u32) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl_secs,
            bcrypt_cost,
        }
    }

    pub fn issue_token(&self, identity: &Identity) -> Result<String> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let exp = Utc::now().timestamp().saturating_add(ttl);
        let claims = Claims {
            sub: identity.user_id,
            email: identity.email.clone(),
            perfil: identity.role,
            exp: usize::try_from(exp).unwrap_or(usize::MAX),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Internal(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)).map_err(|e| {
            let reason = match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "token expired",
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "invalid token signature",
                _ => "malformed token",
            };
            tracing::debug!(error = %e, "rejected bearer token");
            ShopError::InvalidCredential(reason.into())
        })?;
        Ok(Identity { user_id: data.claims.sub, email: data.claims.email, role: data.claims.perfil })
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.bcrypt_cost).map_err(|e| ShopError::Internal(format!("failed to hash password: {e}")))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        bcrypt::verify(password, hash).map_err(|e| ShopError::Internal(format!("failed to verify password: {e}")))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ShopError::Unauthenticated("missing Authorization header".into()))?;
    let value = header
        .to_str()
        .map_err(|_| ShopError::Unauthenticated("unreadable Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ShopError::Unauthenticated("expected 'Bearer <token>'".into()))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    Arc<AuthKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let keys = Arc::<AuthKeys>::from_ref(state);
        let token = bearer_token(parts)?;
        keys.verify(token)
    }
}
