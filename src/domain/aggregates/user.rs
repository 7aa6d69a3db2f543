//! User Aggregate

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account role. Parsed case-insensitively, always written canonically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Admin,
    #[default]
    Cliente,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Admin => "Admin", Self::Cliente => "Cliente" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("admin") { Ok(Self::Admin) }
        else if s.eq_ignore_ascii_case("cliente") { Ok(Self::Cliente) }
        else { Err(format!("unknown role '{s}'")) }
    }
}

impl TryFrom<String> for Role {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Role> for String {
    fn from(role: Role) -> Self { role.as_str().to_string() }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.into(), email: email.into(), password_hash: password_hash.into(),
            role, birth_date: None, phone: None, created_at: Utc::now(),
        }
    }

    pub fn born_in_month(&self, month: u32) -> bool {
        self.birth_date.is_some_and(|d| d.month() == month)
    }
}
