use super::{
    account::{self, AccountId, InternalAccount, Role},
    DbExecutor,
};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_string(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct InternalSession {
    pub id: SessionId,
    pub account_id: AccountId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

pub async fn save(pool: &SqlitePool, account: &InternalAccount) -> Result<InternalSession, Report> {
    let session = InternalSession {
        id: SessionId::new(),
        account_id: account.id.clone(),
        role: account.role,
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO sessions (id, account_id, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(&session.account_id)
        .bind(session.role)
        .bind(session.created_at)
        .execute(pool)
        .await?;
    Ok(session)
}

/// The session together with the account it belongs to. Sessions whose
/// account no longer exists resolve to nothing.
pub async fn resolve(
    pool: &SqlitePool,
    id: &SessionId,
) -> Result<Option<(InternalSession, InternalAccount)>, Report> {
    let session = sqlx::query_as::<_, InternalSession>(
        "SELECT id, account_id, role, created_at FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match session {
        Some(session) => {
            let account = account::by_id(pool, session.role, &session.account_id).await?;
            Ok(account.map(|account| (session, account)))
        }
        None => Ok(None),
    }
}

pub async fn delete(pool: &SqlitePool, id: &SessionId) -> Result<bool, Report> {
    let deleted = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected() > 0)
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<InternalSession, Report>")]
pub struct SaveSession(pub InternalAccount);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveSession> for DbExecutor {
        async fn handle(msg: SaveSession) -> Result<InternalSession, Report> {
            let SaveSession(account) = msg;
            debug!(account_id = account.id.as_string().as_str(), "Save new session for account");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            save(&pool, &account).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Option<(InternalSession, InternalAccount)>, Report>")]
pub struct SessionById(pub SessionId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SessionById> for DbExecutor {
        async fn handle(msg: SessionById) -> Result<Option<(InternalSession, InternalAccount)>, Report> {
            let SessionById(session_id) = msg;
            debug!(id = session_id.as_string().as_str(), "Get session by id");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            resolve(&pool, &session_id).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<bool, Report>")]
pub struct DeleteSession(pub SessionId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<DeleteSession> for DbExecutor {
        async fn handle(msg: DeleteSession) -> Result<bool, Report> {
            let DeleteSession(session_id) = msg;
            debug!(id = session_id.as_string().as_str(), "Delete session");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            delete(&pool, &session_id).await
        }
    }
}
