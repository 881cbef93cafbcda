use std::{str::FromStr, time::Duration};

use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    middleware,
    web::{self, Data},
    App, HttpServer,
};
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

mod auth;
mod category;
mod config;
mod db;
mod errors;
mod format;
mod partners;
mod routes;
mod stats;
mod structs;
#[cfg(test)]
mod test_utils;
mod utils;

use config::Config;
use errors::AppError;

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;
    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().inspect_err(|e| log::error!("FATAL: {}", e))?;

    let db_pool = connect(&config.database_url)
        .await
        .inspect_err(|e| log::error!("FATAL: {}", e))?;
    info!("Database migrated successfully");

    let state = Data::new(AppState { db_pool });
    let session_key = config.session_key.clone();

    info!("Starting HTTP server on http://{}:{}/", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(SessionMiddleware::new(
                CookieSessionStore::default(),
                session_key.clone(),
            ))
            // Logger goes last so it wraps everything
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
            .default_service(web::to(routes::default_handler))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
