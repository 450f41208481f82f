//! Pure checks run at submission boundaries before anything is written.

use crate::db::account::{Credentials, Role};
use crate::db::transaction::TransactionKind;
use crate::rejection::{Field, Rejection};
use crate::services::transaction::SubmissionForm;
use std::ops::RangeInclusive;

pub const ADMIN_IDENTIFIER_LEN: RangeInclusive<usize> = 3..=10;
pub const ADMIN_PASSWORD_LEN: RangeInclusive<usize> = 4..=12;
pub const USER_NAME_MIN_LEN: usize = 3;
pub const USER_PASSWORD_LEN: RangeInclusive<usize> = 6..=12;

fn check_len(field: Field, value: &str, bounds: &RangeInclusive<usize>) -> Result<(), Rejection> {
    if bounds.contains(&value.chars().count()) {
        Ok(())
    } else {
        Err(Rejection::LengthOutOfRange {
            field,
            min: *bounds.start(),
            max: *bounds.end(),
        })
    }
}

fn check_min_len(field: Field, value: &str, min: usize) -> Result<(), Rejection> {
    if value.chars().count() >= min {
        Ok(())
    } else {
        Err(Rejection::TooShort { field, min })
    }
}

/// Length bounds for the credential set selected by `role`.
///
/// Used both when registering and when signing in.
pub fn check_credentials(role: Role, credentials: &Credentials) -> Result<(), Rejection> {
    match role {
        Role::Admin => {
            check_len(
                Field::AdminIdentifier,
                &credentials.name,
                &ADMIN_IDENTIFIER_LEN,
            )?;
            check_len(
                Field::AdminPassword,
                &credentials.password,
                &ADMIN_PASSWORD_LEN,
            )
        }
        Role::User => {
            check_min_len(Field::UserName, &credentials.name, USER_NAME_MIN_LEN)?;
            check_len(
                Field::UserPassword,
                &credentials.password,
                &USER_PASSWORD_LEN,
            )
        }
    }
}

fn check_required(field: Field, value: &str) -> Result<(), Rejection> {
    if value.trim().is_empty() {
        Err(Rejection::Missing(field))
    } else {
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

pub fn check_submission_form(form: &SubmissionForm) -> Result<(), Rejection> {
    check_required(Field::StudentName, &form.student_name)?;
    check_required(Field::Program, &form.program)?;
    check_required(Field::Email, &form.email)?;
    if !looks_like_email(form.email.trim()) {
        return Err(Rejection::InvalidEmail(form.email.clone()));
    }
    Ok(())
}

/// Bets need an existing student, registrations need a new one.
pub fn check_student_reference(
    kind: TransactionKind,
    student_name: &str,
    student_exists: bool,
) -> Result<(), Rejection> {
    match (kind, student_exists) {
        (TransactionKind::Bet, false) => Err(Rejection::StudentNotFound(student_name.to_owned())),
        (TransactionKind::Registration, true) => Err(Rejection::StudentAlreadyRegistered(
            student_name.to_owned(),
        )),
        _ => Ok(()),
    }
}
