use actix_web::cookie::Key;

use crate::errors::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://migasto.db";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session_key: Key,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::ConfigError(format!("PORT is not a valid port: {raw}")))?,
            None => 8080,
        };

        let key_str = lookup("SESSION_KEY")
            .ok_or_else(|| AppError::ConfigError("SESSION_KEY is not set".to_owned()))?;
        // the cookie key needs at least 64 bytes of material
        let session_key = Key::try_from(key_str.as_bytes())
            .map_err(|e| AppError::ConfigError(format!("SESSION_KEY is unusable: {e}")))?;

        Ok(Self {
            database_url,
            host,
            port,
            session_key,
        })
    }
}
