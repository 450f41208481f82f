use casinobet_server::db::{
    self,
    account::{self, Credentials, Role},
};
use sqlx::SqlitePool;
use tracing::debug;

pub const ADMIN_IDENTIFIER: &str = "boss";
pub const ADMIN_PASSWORD: &str = "1234";
pub const USER_NAME: &str = "ana1";
pub const USER_PASSWORD: &str = "secret1";

async fn init_fixtures_test_db(pool: &SqlitePool) {
    debug!("Registering fixture accounts");
    for (role, name, password) in [
        (Role::Admin, ADMIN_IDENTIFIER, ADMIN_PASSWORD),
        (Role::User, USER_NAME, USER_PASSWORD),
    ] {
        let credentials = Credentials {
            name: name.to_owned(),
            password: password.to_owned(),
        };
        account::register(pool, role, &credentials).await.unwrap();
    }
}

/// Private in-memory store per test.
pub struct IntegrationTestDb {
    pool: SqlitePool,
}

impl IntegrationTestDb {
    /// Store with one admin and one user account.
    pub async fn new() -> Self {
        let db = Self::empty().await;
        init_fixtures_test_db(&db.pool).await;
        db
    }

    /// Migrated store without any records.
    pub async fn empty() -> Self {
        debug!("Creating test db");
        let pool = db::new_memory_pool().await.unwrap();
        Self { pool }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}
