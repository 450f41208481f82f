//! Which view a connection may reach.
//!
//! Denied requests are redirected rather than rejected: a client without an
//! identity lands on the login view and a user asking for the admin view
//! lands on their dashboard.

use crate::db::account::InternalAccount;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Login,
    Register,
    Dashboard,
    Admin,
}

pub fn resolve(identity: Option<&InternalAccount>, requested: View) -> View {
    match (identity, requested) {
        (_, View::Login) | (_, View::Register) => requested,
        (None, _) => View::Login,
        (Some(account), View::Admin) if !account.is_admin() => View::Dashboard,
        (Some(_), view) => view,
    }
}
