use actix_web::{App, HttpServer};
use casinobet_server::{config::Config, db, log, server, services::Services};
use color_eyre::eyre::{Report, WrapErr};
use tracing::info;

#[actix_rt::main]
async fn main() -> Result<(), Report> {
    log::install()?;
    let config = Config::from_env()?;

    let pool = db::new_pool(&config.database_url, config.max_connections).await?;
    db::migrate(&pool).await?;
    let services = Services::start(pool);

    info!(address = config.bind_address.as_str(), "Starting WS server");

    // Create Http server with websocket support
    HttpServer::new(move || {
        let services = services.clone();
        App::new().configure(move |app| server::configure(app, services))
    })
    .bind(config.bind_address.as_str())
    .wrap_err_with(|| format!("Unable to bind {}", config.bind_address))?
    .run()
    .await?;
    Ok(())
}
