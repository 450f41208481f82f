use color_eyre::eyre::{Report, WrapErr};
use std::{env, fmt::Display, str::FromStr};
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://casinobet.db";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub max_connections: u32,
}

impl Config {
    /// Reads `.env` when present, then the process environment.
    pub fn from_env() -> Result<Self, Report> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Report>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: load(&lookup, "DATABASE_URL", DEFAULT_DATABASE_URL.to_owned())?,
            bind_address: load(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS.to_owned())?,
            max_connections: load(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

fn load<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Report>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .wrap_err_with(|| format!("Invalid {key} value {value:?}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
