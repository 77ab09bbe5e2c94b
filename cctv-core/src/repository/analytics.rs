use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{AnalyticsQuery, AnalyticsRecord, NewAnalyticsRecord},
    Result,
};

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Persist one record, stamping it with the current time
    async fn create(&self, record: &NewAnalyticsRecord) -> Result<AnalyticsRecord>;

    /// Records newest first
    async fn list(&self, query: AnalyticsQuery) -> Result<Vec<AnalyticsRecord>>;
}

#[derive(Clone)]
pub struct PgAnalyticsRepository {
    pool: PgPool,
}

impl PgAnalyticsRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<AnalyticsRecord> {
        Ok(AnalyticsRecord {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            object_type: row.try_get("object_type")?,
            count: row.try_get("count")?,
            area_name: row.try_get("area_name")?,
        })
    }
}

#[async_trait]
impl AnalyticsRepository for PgAnalyticsRepository {
    async fn create(&self, record: &NewAnalyticsRecord) -> Result<AnalyticsRecord> {
        record.validate()?;

        let row = sqlx::query(
            r"
            INSERT INTO analytics_data (timestamp, object_type, count, area_name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, timestamp, object_type, count, area_name
            ",
        )
        .bind(Utc::now())
        .bind(&record.object_type)
        .bind(record.count)
        .bind(&record.area_name)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(&row)
    }

    async fn list(&self, query: AnalyticsQuery) -> Result<Vec<AnalyticsRecord>> {
        let query = query.normalized();

        let rows = sqlx::query(
            r"
            SELECT id, timestamp, object_type, count, area_name
            FROM analytics_data
            ORDER BY timestamp DESC, id DESC
            OFFSET $1
            LIMIT $2
            ",
        )
        .bind(query.skip)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

/// Process-local analytics store
#[derive(Default)]
pub struct MemoryAnalyticsRepository {
    records: RwLock<Vec<AnalyticsRecord>>,
    next_id: AtomicI64,
}

impl MemoryAnalyticsRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalyticsRepository for MemoryAnalyticsRepository {
    async fn create(&self, record: &NewAnalyticsRecord) -> Result<AnalyticsRecord> {
        record.validate()?;

        let stored = AnalyticsRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            object_type: record.object_type.clone(),
            count: record.count,
            area_name: record.area_name.clone(),
        };
        self.records.write().push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, query: AnalyticsQuery) -> Result<Vec<AnalyticsRecord>> {
        let query = query.normalized();
        let records = self.records.read();

        let mut sorted: Vec<&AnalyticsRecord> = records.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        Ok(sorted
            .into_iter()
            .skip(usize::try_from(query.skip).unwrap_or(0))
            .take(usize::try_from(query.limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}
