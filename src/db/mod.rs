pub mod account;
pub mod session;
pub mod store;
pub mod student;
pub mod transaction;

use actix::prelude::*;
use color_eyre::eyre::{Report, WrapErr};
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::{str::FromStr, time::Duration};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug)]
pub struct DbExecutor(pub SqlitePool);

impl DbExecutor {
    pub fn pool(&mut self) -> SqlitePool {
        self.0.clone()
    }
}

impl Actor for DbExecutor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Db executor started");
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Every in-memory connection can be its own database, so memory stores get
/// exactly one connection that is never recycled.
pub async fn new_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, Report> {
    let connect_options = SqliteConnectOptions::from_str(database_url)
        .wrap_err_with(|| format!("Invalid database url {}", database_url))?
        .create_if_missing(true);
    let pool_options = if is_memory_url(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };
    new_pool_with(connect_options, pool_options).await
}

pub async fn new_pool_with(
    connect_options: SqliteConnectOptions,
    pool_options: SqlitePoolOptions,
) -> Result<SqlitePool, Report> {
    let pool = pool_options
        .connect_with(connect_options.foreign_keys(true))
        .await?;
    Ok(pool)
}

pub async fn new_memory_pool() -> Result<SqlitePool, Report> {
    let pool = new_pool("sqlite::memory:", 1).await?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), Report> {
    MIGRATOR
        .run(pool)
        .await
        .wrap_err("Failed to apply migrations")?;
    Ok(())
}
