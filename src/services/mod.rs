use crate::db::DbExecutor;
use crate::websocket::WsClient;
use actix::prelude::*;
use sqlx::SqlitePool;
use std::fmt;
use tracing::info;

pub mod account;
pub mod broadcast;
pub mod store;
pub mod student;
pub mod transaction;

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Connect {
    pub addr: Addr<WsClient>,
}

impl fmt::Debug for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect").finish()
    }
}

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub addr: Addr<WsClient>,
}

impl fmt::Debug for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disconnect").finish()
    }
}

/// Addresses of the service actors, started once and handed to every
/// connection.
#[derive(Clone)]
pub struct Services {
    pub accounts: Addr<account::AccountActor>,
    pub transactions: Addr<transaction::TransactionActor>,
    pub students: Addr<student::StudentActor>,
    pub store: Addr<store::StoreActor>,
    pub broadcast: Addr<broadcast::BroadcastActor>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish()
    }
}

impl Services {
    /// Starts the store executor and the service actors on the current
    /// arbiter.
    pub fn start(pool: SqlitePool) -> Self {
        let db = DbExecutor(pool).start();
        let broadcast = broadcast::BroadcastActor::new().start();
        let services = Self {
            accounts: account::AccountActor::new(db.clone()).start(),
            transactions: transaction::TransactionActor::new(db.clone(), broadcast.clone())
                .start(),
            students: student::StudentActor::new(db.clone()).start(),
            store: store::StoreActor::new(db).start(),
            broadcast,
        };
        info!("Services started");
        services
    }
}
