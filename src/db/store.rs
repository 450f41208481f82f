//! Whole-collection access to the store.
//!
//! Collections are addressed by their legacy `mock_db_*` keys. Records use
//! this server's own field names, so only dumps taken from this server can be
//! imported.

use super::{
    account::AccountId,
    student::{self, InternalStudent},
    transaction::{self, InternalTransaction},
    DbExecutor,
};
use crate::async_message_handler_with_span;
use crate::rejection::Rejection;
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::fmt;
use tracing::{debug, info};

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub enum Collection {
    #[serde(rename = "mock_db_users")]
    Users,
    #[serde(rename = "mock_db_admins")]
    Admins,
    #[serde(rename = "mock_db_students")]
    Students,
    #[serde(rename = "mock_db_transactions")]
    Transactions,
}

impl Collection {
    pub fn key(self) -> &'static str {
        match self {
            Collection::Users => "mock_db_users",
            Collection::Admins => "mock_db_admins",
            Collection::Students => "mock_db_students",
            Collection::Transactions => "mock_db_transactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Stored login, kept in plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct CredentialRecord {
    #[serde(default)]
    pub id: AccountId,
    pub identifier: String,
    pub password: String,
}

fn to_values<T: Serialize>(records: &[T]) -> Result<Vec<Value>, serde_json::Error> {
    records.iter().map(serde_json::to_value).collect()
}

fn parse<T: DeserializeOwned>(collection: Collection, records: Vec<Value>) -> Result<Vec<T>, Rejection> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(record).map_err(|err| Rejection::MalformedRecord {
                collection: collection.key(),
                reason: format!("record {}: {}", index, err),
            })
        })
        .collect()
}

fn duplicate(collection: Collection, err: sqlx::Error, name: &str) -> Report {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Rejection::MalformedRecord {
                collection: collection.key(),
                reason: format!("duplicate entry {:?}", name),
            }
            .into()
        }
        _ => err.into(),
    }
}

/// Records of a collection in storage order.
pub async fn load(pool: &SqlitePool, collection: Collection) -> Result<Vec<Value>, Report> {
    let records = match collection {
        Collection::Users => {
            let users = sqlx::query_as::<_, CredentialRecord>(
                "SELECT id, username AS identifier, password FROM users ORDER BY seq",
            )
            .fetch_all(pool)
            .await?;
            to_values(&users)?
        }
        Collection::Admins => {
            let admins = sqlx::query_as::<_, CredentialRecord>(
                "SELECT id, identifier, password FROM admins",
            )
            .fetch_all(pool)
            .await?;
            to_values(&admins)?
        }
        Collection::Students => to_values(&student::all(pool).await?)?,
        Collection::Transactions => to_values(&transaction::list(pool, None).await?)?,
    };
    Ok(records)
}

/// Replaces a collection with `records`. Every record is parsed before the
/// store is touched and the replacement is a single SQL transaction, so a
/// failed save leaves the previous collection in place.
pub async fn save(
    pool: &SqlitePool,
    collection: Collection,
    records: Vec<Value>,
) -> Result<usize, Report> {
    let count = records.len();
    match collection {
        Collection::Users => {
            let users: Vec<CredentialRecord> = parse(collection, records)?;
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
            for user in &users {
                sqlx::query("INSERT INTO users (id, username, password) VALUES (?, ?, ?)")
                    .bind(&user.id)
                    .bind(&user.identifier)
                    .bind(&user.password)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| duplicate(collection, err, &user.identifier))?;
            }
            tx.commit().await?;
        }
        Collection::Admins => {
            let admins: Vec<CredentialRecord> = parse(collection, records)?;
            if admins.len() > 1 {
                return Err(Rejection::AdminCapacityReached.into());
            }
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM admins").execute(&mut *tx).await?;
            for admin in &admins {
                sqlx::query(
                    "INSERT INTO admins (slot, id, identifier, password) VALUES (1, ?, ?, ?)",
                )
                .bind(&admin.id)
                .bind(&admin.identifier)
                .bind(&admin.password)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Collection::Students => {
            let students: Vec<InternalStudent> = parse(collection, records)?;
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM students").execute(&mut *tx).await?;
            for student in &students {
                sqlx::query(
                    "INSERT INTO students (id, name, program, vote_count) VALUES (?, ?, ?, ?)",
                )
                .bind(&student.id)
                .bind(&student.name)
                .bind(&student.program)
                .bind(student.vote_count)
                .execute(&mut *tx)
                .await
                .map_err(|err| duplicate(collection, err, &student.name))?;
            }
            tx.commit().await?;
        }
        Collection::Transactions => {
            let transactions: Vec<InternalTransaction> = parse(collection, records)?;
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM transactions")
                .execute(&mut *tx)
                .await?;
            for record in &transactions {
                transaction::insert(&mut *tx, record)
                    .await
                    .map_err(|err| duplicate(collection, err, &record.id.to_string()))?;
            }
            tx.commit().await?;
        }
    }
    info!(collection = collection.key(), count, "Collection replaced");
    Ok(count)
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<Value>, Report>")]
pub struct LoadCollection(pub Collection);

async_message_handler_with_span! {
    impl AsyncSpanHandler<LoadCollection> for DbExecutor {
        async fn handle(msg: LoadCollection) -> Result<Vec<Value>, Report> {
            debug!(collection = msg.0.key(), "Loading collection");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            load(&pool, msg.0).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<usize, Report>")]
pub struct SaveCollection(pub Collection, pub Vec<Value>);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveCollection> for DbExecutor {
        async fn handle(msg: SaveCollection) -> Result<usize, Report> {
            let SaveCollection(collection, records) = msg;
            debug!(collection = collection.key(), count = records.len(), "Saving collection");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            save(&pool, collection, records).await
        }
    }
}
