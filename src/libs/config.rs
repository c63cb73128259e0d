use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::libs::error::{Error, Result};

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Option<Duration>,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            acquire_timeout: None,
        }
    }

    /// Reads `DATABASE_URL` and, if set, `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::configuration("DATABASE_URL is not set"))?;
        let mut config = Self::new(url);

        if let Ok(raw) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = raw.parse().map_err(|_| {
                Error::configuration(format!("DATABASE_MAX_CONNECTIONS is not a number: {raw}"))
            })?;
        }
        Ok(config)
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    fn pool_options(&self) -> PgPoolOptions {
        let options = PgPoolOptions::new().max_connections(self.max_connections);
        match self.acquire_timeout {
            Some(timeout) => options.acquire_timeout(timeout),
            None => options,
        }
    }

    pub async fn connect(&self) -> Result<PgPool> {
        info!(max_connections = self.max_connections, "connecting to database");
        Ok(self.pool_options().connect(&self.url).await?)
    }

    /// Builds a pool without opening a connection until first use.
    pub fn connect_lazy(&self) -> Result<PgPool> {
        Ok(self.pool_options().connect_lazy(&self.url)?)
    }
}
