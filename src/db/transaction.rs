//! Submitted registrations and bets.
//!
//! A transaction is created pending and decided exactly once. Deciding is a
//! single SQL transaction covering the status change and the vote credit, so
//! a tally never reflects a decision that was not stored and vice versa.

use super::{account::AccountId, student, student::InternalStudent, DbExecutor};
use crate::async_message_handler_with_span;
use crate::rejection::Rejection;
use crate::validation::check_student_reference;
use actix::prelude::*;
use actix_interop::with_ctx;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{sqlite::SqliteArguments, Sqlite, SqlitePool};
use std::fmt;
use tracing::{debug, info};

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        };
        f.write_str(status)
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionKind {
    Registration,
    Bet,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct InternalTransaction {
    pub id: TransactionId,
    pub submitter_user_id: AccountId,
    pub submitter_name: String,
    pub student_name: String,
    pub program: String,
    pub contact_email: String,
    pub receipt_file_name: String,
    pub receipt_content: String,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a decision: the stored transaction and, when approved, the
/// credited student.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub transaction: InternalTransaction,
    pub student: Option<InternalStudent>,
}

/// Transactions per status, for the review tabs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u32,
    pub approved: u32,
    pub rejected: u32,
}

const TRANSACTION_COLUMNS: &str = r#"
    id, submitter_user_id, submitter_name, student_name, program, contact_email,
    receipt_file_name, receipt_content, status, kind, created_at
"#;

type TransactionQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_columns<'q>(
    query: TransactionQuery<'q>,
    transaction: &'q InternalTransaction,
) -> TransactionQuery<'q> {
    query
        .bind(&transaction.id)
        .bind(&transaction.submitter_user_id)
        .bind(&transaction.submitter_name)
        .bind(&transaction.student_name)
        .bind(&transaction.program)
        .bind(&transaction.contact_email)
        .bind(&transaction.receipt_file_name)
        .bind(&transaction.receipt_content)
        .bind(transaction.status)
        .bind(transaction.kind)
        .bind(transaction.created_at)
}

pub(crate) async fn insert<'e, E>(
    executor: E,
    transaction: &InternalTransaction,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        TRANSACTION_COLUMNS
    );
    bind_columns(sqlx::query(&sql), transaction)
        .execute(executor)
        .await?;
    Ok(())
}

/// Appends a pending transaction. The student reference is checked by the
/// INSERT itself, so concurrent writers never hold a read lock they must
/// upgrade, and nothing is written when the check fails.
pub async fn submit(
    pool: &SqlitePool,
    transaction: InternalTransaction,
) -> Result<InternalTransaction, Report> {
    let student_must_exist = transaction.kind == TransactionKind::Bet;
    let sql = format!(
        r#"
        INSERT INTO transactions ({})
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE (EXISTS (SELECT 1 FROM students WHERE name = ?)) = ?
        "#,
        TRANSACTION_COLUMNS
    );
    let inserted = bind_columns(sqlx::query(&sql), &transaction)
        .bind(&transaction.student_name)
        .bind(student_must_exist)
        .execute(pool)
        .await?;
    if inserted.rows_affected() == 0 {
        // The guard failed, so the student's presence is the opposite of
        // what this kind requires.
        check_student_reference(
            transaction.kind,
            &transaction.student_name,
            !student_must_exist,
        )?;
    }
    info!(
        id = %transaction.id,
        kind = ?transaction.kind,
        student = transaction.student_name.as_str(),
        "Transaction submitted"
    );
    Ok(transaction)
}

/// Decides a pending transaction. The guarded UPDATE is the first statement
/// of the SQL transaction so concurrent decides queue on the write lock and
/// the loser sees the terminal status.
pub async fn decide(
    pool: &SqlitePool,
    id: &TransactionId,
    approve: bool,
) -> Result<Decision, Report> {
    let status = if approve {
        TransactionStatus::Approved
    } else {
        TransactionStatus::Rejected
    };
    let mut tx = pool.begin().await?;
    let decided = sqlx::query_as::<_, InternalTransaction>(&format!(
        "UPDATE transactions SET status = ? WHERE id = ? AND status = ? RETURNING {}",
        TRANSACTION_COLUMNS
    ))
    .bind(status)
    .bind(id)
    .bind(TransactionStatus::Pending)
    .fetch_optional(&mut *tx)
    .await?;

    let transaction = match decided {
        Some(transaction) => transaction,
        None => {
            let current: Option<TransactionStatus> =
                sqlx::query_scalar("SELECT status FROM transactions WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(current) => Rejection::AlreadyDecided(id.clone(), current),
                None => Rejection::TransactionNotFound(id.clone()),
            }
            .into());
        }
    };

    // Every approval credits the named student, registrations included.
    let student = if approve {
        Some(
            student::credit_vote(&mut *tx, &transaction.student_name, &transaction.program)
                .await?,
        )
    } else {
        None
    };
    tx.commit().await?;

    info!(id = %id, status = %status, "Transaction decided");
    Ok(Decision {
        transaction,
        student,
    })
}

/// Transactions in storage order, optionally of a single status.
pub async fn list<'e, E>(
    executor: E,
    status: Option<TransactionStatus>,
) -> Result<Vec<InternalTransaction>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    match status {
        Some(status) => {
            sqlx::query_as::<_, InternalTransaction>(&format!(
                "SELECT {} FROM transactions WHERE status = ? ORDER BY seq",
                TRANSACTION_COLUMNS
            ))
            .bind(status)
            .fetch_all(executor)
            .await
        }
        None => {
            sqlx::query_as::<_, InternalTransaction>(&format!(
                "SELECT {} FROM transactions ORDER BY seq",
                TRANSACTION_COLUMNS
            ))
            .fetch_all(executor)
            .await
        }
    }
}

pub async fn counts(pool: &SqlitePool) -> Result<StatusCounts, sqlx::Error> {
    let rows: Vec<(TransactionStatus, u32)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM transactions GROUP BY status")
            .fetch_all(pool)
            .await?;
    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        match status {
            TransactionStatus::Pending => counts.pending = count,
            TransactionStatus::Approved => counts.approved = count,
            TransactionStatus::Rejected => counts.rejected = count,
        }
    }
    Ok(counts)
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<InternalTransaction, Report>")]
pub struct SubmitTransaction(pub InternalTransaction);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SubmitTransaction> for DbExecutor {
        async fn handle(msg: SubmitTransaction) -> Result<InternalTransaction, Report> {
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            submit(&pool, msg.0).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Decision, Report>")]
pub struct DecideTransaction {
    pub id: TransactionId,
    pub approve: bool,
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<DecideTransaction> for DbExecutor {
        async fn handle(msg: DecideTransaction) -> Result<Decision, Report> {
            debug!(id = %msg.id, approve = msg.approve, "Deciding transaction");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            decide(&pool, &msg.id, msg.approve).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<(Vec<InternalTransaction>, StatusCounts), Report>")]
pub struct TransactionsByStatus(pub TransactionStatus);

async_message_handler_with_span! {
    impl AsyncSpanHandler<TransactionsByStatus> for DbExecutor {
        async fn handle(msg: TransactionsByStatus) -> Result<(Vec<InternalTransaction>, StatusCounts), Report> {
            debug!(status = %msg.0, "Retrieving transactions");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            let transactions = list(&pool, Some(msg.0)).await?;
            let counts = counts(&pool).await?;
            Ok((transactions, counts))
        }
    }
}
