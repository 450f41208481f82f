use super::DbExecutor;
use crate::async_message_handler_with_span;
use crate::rejection::Rejection;
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{Sqlite, SqlitePool};
use std::fmt;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_string(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Signed-up identity, user or admin.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct InternalAccount {
    pub id: AccountId,
    pub name: String,
    pub role: Role,
}

impl InternalAccount {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn unique_violation_as(err: sqlx::Error, rejection: Rejection) -> Report {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => rejection.into(),
        _ => err.into(),
    }
}

pub async fn admin_count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM admins")
        .fetch_one(executor)
        .await
}

pub async fn register(
    pool: &SqlitePool,
    role: Role,
    credentials: &Credentials,
) -> Result<InternalAccount, Report> {
    let account = InternalAccount {
        id: AccountId::new(),
        name: credentials.name.clone(),
        role,
    };
    let (query, conflict) = match role {
        Role::User => (
            "INSERT INTO users (id, username, password) VALUES (?, ?, ?)",
            Rejection::DuplicateUserName(credentials.name.clone()),
        ),
        Role::Admin => (
            "INSERT INTO admins (slot, id, identifier, password) VALUES (1, ?, ?, ?)",
            Rejection::AdminCapacityReached,
        ),
    };
    sqlx::query(query)
        .bind(&account.id)
        .bind(&credentials.name)
        .bind(&credentials.password)
        .execute(pool)
        .await
        .map_err(|err| unique_violation_as(err, conflict))?;
    Ok(account)
}

pub async fn by_credentials(
    pool: &SqlitePool,
    role: Role,
    credentials: &Credentials,
) -> Result<Option<InternalAccount>, sqlx::Error> {
    let query = match role {
        Role::User => {
            "SELECT id, username AS name, 'user' AS role FROM users WHERE username = ? AND password = ?"
        }
        Role::Admin => {
            "SELECT id, identifier AS name, 'admin' AS role FROM admins WHERE identifier = ? AND password = ?"
        }
    };
    sqlx::query_as::<_, InternalAccount>(query)
        .bind(&credentials.name)
        .bind(&credentials.password)
        .fetch_optional(pool)
        .await
}

pub async fn by_id(
    pool: &SqlitePool,
    role: Role,
    id: &AccountId,
) -> Result<Option<InternalAccount>, sqlx::Error> {
    let query = match role {
        Role::User => "SELECT id, username AS name, 'user' AS role FROM users WHERE id = ?",
        Role::Admin => "SELECT id, identifier AS name, 'admin' AS role FROM admins WHERE id = ?",
    };
    sqlx::query_as::<_, InternalAccount>(query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[derive(Message, Clone)]
#[rtype(result = "Result<i64, Report>")]
pub struct AdminCount;

async_message_handler_with_span! {
    impl AsyncSpanHandler<AdminCount> for DbExecutor {
        async fn handle(_msg: AdminCount) -> Result<i64, Report> {
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            Ok(admin_count(&pool).await?)
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<InternalAccount, Report>")]
pub struct RegisterAccount(pub Role, pub Credentials);

async_message_handler_with_span! {
    impl AsyncSpanHandler<RegisterAccount> for DbExecutor {
        async fn handle(msg: RegisterAccount) -> Result<InternalAccount, Report> {
            let RegisterAccount(role, credentials) = msg;
            debug!(role = %role, name = credentials.name.as_str(), "Registering account");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            register(&pool, role, &credentials).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Option<InternalAccount>, Report>")]
pub struct AccountByCredentials(pub Role, pub Credentials);

async_message_handler_with_span! {
    impl AsyncSpanHandler<AccountByCredentials> for DbExecutor {
        async fn handle(msg: AccountByCredentials) -> Result<Option<InternalAccount>, Report> {
            let AccountByCredentials(role, credentials) = msg;
            debug!(role = %role, name = credentials.name.as_str(), "Looking up credentials");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            Ok(by_credentials(&pool, role, &credentials).await?)
        }
    }
}
