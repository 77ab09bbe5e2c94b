//! Database initialization

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::Config;

/// Connect to PostgreSQL, or return `None` when no database is configured.
///
/// Migrations are run separately by the binary crate.
pub async fn init_database(config: &Config) -> Result<Option<PgPool>> {
    let database_url = config.database.url.trim();
    if database_url.is_empty() {
        warn!("No database configured, analytics and zones are kept in memory");
        return Ok(None);
    }

    info!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .connect(database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            anyhow::anyhow!("Database connection failed: {}", e)
        })?;

    info!("Database connected successfully");

    Ok(Some(pool))
}
