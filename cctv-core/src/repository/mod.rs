//! Data access for analytics counts and camera zones
//!
//! Each repository is a trait with a PostgreSQL implementation and an
//! in-memory one used when no database is configured.

pub mod analytics;
pub mod zone;

pub use analytics::{AnalyticsRepository, MemoryAnalyticsRepository, PgAnalyticsRepository};
pub use zone::{MemoryZoneRepository, PgZoneRepository, ZoneRepository};

use std::sync::Arc;

use sqlx::PgPool;

/// Repository set shared by the HTTP layer and detection workers
#[derive(Clone)]
pub struct Repositories {
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub zones: Arc<dyn ZoneRepository>,
}

impl Repositories {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            analytics: Arc::new(PgAnalyticsRepository::new(pool.clone())),
            zones: Arc::new(PgZoneRepository::new(pool)),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            analytics: Arc::new(MemoryAnalyticsRepository::new()),
            zones: Arc::new(MemoryZoneRepository::new()),
        }
    }

    /// PostgreSQL when a pool is available, otherwise in-memory
    #[must_use]
    pub fn from_pool(pool: Option<PgPool>) -> Self {
        pool.map_or_else(Self::in_memory, Self::postgres)
    }
}
