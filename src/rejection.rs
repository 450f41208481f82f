//! Client-facing failures.
//!
//! Every rule that can refuse a request has its own variant so callers can
//! tell which rule failed. Rejections travel through the actor layers inside
//! an `eyre::Report` and are recovered at the connection with `downcast_ref`.

use crate::db::transaction::{TransactionId, TransactionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Input fields named by validation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    AdminIdentifier,
    AdminPassword,
    UserName,
    UserPassword,
    StudentName,
    Program,
    Email,
    Receipt,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::AdminIdentifier => "admin identifier",
            Field::AdminPassword => "admin password",
            Field::UserName => "user name",
            Field::UserPassword => "password",
            Field::StudentName => "student name",
            Field::Program => "program",
            Field::Email => "contact email",
            Field::Receipt => "receipt",
        };
        f.write_str(name)
    }
}

/// Error taxonomy reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Validation,
    Authentication,
    Capacity,
    Resource,
    NotFound,
    Conflict,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{field} must be between {min} and {max} characters")]
    LengthOutOfRange {
        field: Field,
        min: usize,
        max: usize,
    },
    #[error("{field} must be at least {min} characters")]
    TooShort { field: Field, min: usize },
    #[error("{0} is required")]
    Missing(Field),
    #[error("{0:?} is not a valid email address")]
    InvalidEmail(String),
    #[error("user name {0:?} is already taken")]
    DuplicateUserName(String),
    #[error("student {0:?} does not exist")]
    StudentNotFound(String),
    #[error("student {0:?} is already registered")]
    StudentAlreadyRegistered(String),
    #[error("receipt could not be decoded: {0}")]
    MalformedReceipt(String),
    #[error("malformed {collection} record: {reason}")]
    MalformedRecord {
        collection: &'static str,
        reason: String,
    },
    #[error("identifier or password is incorrect")]
    InvalidCredentials,
    #[error("session does not exist")]
    UnknownSession,
    #[error("only one administrator can be registered")]
    AdminCapacityReached,
    #[error("receipt is {size} bytes, the limit is {limit} bytes")]
    ReceiptTooLarge { size: usize, limit: usize },
    #[error("receipt type {0:?} is not accepted, expected an image or a PDF")]
    UnsupportedReceipt(String),
    #[error("transaction {0} does not exist")]
    TransactionNotFound(TransactionId),
    #[error("transaction {0} is already {1}")]
    AlreadyDecided(TransactionId, TransactionStatus),
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::LengthOutOfRange { .. }
            | Rejection::TooShort { .. }
            | Rejection::Missing(_)
            | Rejection::InvalidEmail(_)
            | Rejection::DuplicateUserName(_)
            | Rejection::StudentNotFound(_)
            | Rejection::StudentAlreadyRegistered(_)
            | Rejection::MalformedReceipt(_)
            | Rejection::MalformedRecord { .. } => RejectionKind::Validation,
            Rejection::InvalidCredentials | Rejection::UnknownSession => {
                RejectionKind::Authentication
            }
            Rejection::AdminCapacityReached => RejectionKind::Capacity,
            Rejection::ReceiptTooLarge { .. } | Rejection::UnsupportedReceipt(_) => {
                RejectionKind::Resource
            }
            Rejection::TransactionNotFound(_) => RejectionKind::NotFound,
            Rejection::AlreadyDecided(..) => RejectionKind::Conflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Report;

    #[test]
    fn survives_a_report_round_trip() {
        let report: Report = Rejection::StudentNotFound("Ana".to_owned()).into();
        let rejection = report.downcast_ref::<Rejection>();
        assert_eq!(
            rejection,
            Some(&Rejection::StudentNotFound("Ana".to_owned()))
        );
        assert_eq!(report.to_string(), "student \"Ana\" does not exist");
    }

    #[test]
    fn maps_rules_to_kinds() {
        assert_eq!(
            Rejection::AdminCapacityReached.kind(),
            RejectionKind::Capacity
        );
        assert_eq!(
            Rejection::InvalidCredentials.kind(),
            RejectionKind::Authentication
        );
        assert_eq!(
            Rejection::ReceiptTooLarge { size: 6, limit: 5 }.kind(),
            RejectionKind::Resource
        );
        assert_eq!(
            Rejection::TooShort {
                field: Field::UserName,
                min: 3
            }
            .to_string(),
            "user name must be at least 3 characters"
        );
    }
}
