use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};

use crate::{
    models::{CameraZone, ZonePoint},
    Error, Result,
};

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn get(&self, camera_id: &str) -> Result<Option<CameraZone>>;

    async fn list(&self) -> Result<Vec<CameraZone>>;

    /// Create the camera's zone or replace its points, reactivating it
    async fn upsert(&self, camera_id: &str, points: &[ZonePoint]) -> Result<CameraZone>;
}

fn validate_points(camera_id: &str, points: &[ZonePoint]) -> Result<()> {
    if camera_id.trim().is_empty() {
        return Err(Error::InvalidInput("camera_id must not be empty".to_string()));
    }
    if !points.is_empty() && points.len() < 3 {
        return Err(Error::InvalidInput(
            "a zone needs at least 3 points".to_string(),
        ));
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(Error::InvalidInput("zone points must be finite".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgZoneRepository {
    pool: PgPool,
}

impl PgZoneRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_zone(row: &PgRow) -> Result<CameraZone> {
        let Json(points): Json<Vec<ZonePoint>> = row.try_get("points")?;
        Ok(CameraZone {
            id: row.try_get("id")?,
            camera_id: row.try_get("camera_id")?,
            points,
            is_active: row.try_get("is_active")?,
        })
    }
}

#[async_trait]
impl ZoneRepository for PgZoneRepository {
    async fn get(&self, camera_id: &str) -> Result<Option<CameraZone>> {
        let row = sqlx::query(
            r"
            SELECT id, camera_id, points, is_active
            FROM camera_zones
            WHERE camera_id = $1
            ",
        )
        .bind(camera_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_zone).transpose()
    }

    async fn list(&self) -> Result<Vec<CameraZone>> {
        let rows = sqlx::query(
            r"
            SELECT id, camera_id, points, is_active
            FROM camera_zones
            ORDER BY camera_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_zone).collect()
    }

    async fn upsert(&self, camera_id: &str, points: &[ZonePoint]) -> Result<CameraZone> {
        validate_points(camera_id, points)?;

        let row = sqlx::query(
            r"
            INSERT INTO camera_zones (camera_id, points, is_active)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (camera_id)
            DO UPDATE SET points = EXCLUDED.points, is_active = TRUE, updated_at = NOW()
            RETURNING id, camera_id, points, is_active
            ",
        )
        .bind(camera_id)
        .bind(Json(points))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_zone(&row)
    }
}

/// Process-local zone store keyed by camera id
#[derive(Default)]
pub struct MemoryZoneRepository {
    zones: RwLock<BTreeMap<String, CameraZone>>,
    next_id: AtomicI64,
}

impl MemoryZoneRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ZoneRepository for MemoryZoneRepository {
    async fn get(&self, camera_id: &str) -> Result<Option<CameraZone>> {
        Ok(self.zones.read().get(camera_id).cloned())
    }

    async fn list(&self) -> Result<Vec<CameraZone>> {
        Ok(self.zones.read().values().cloned().collect())
    }

    async fn upsert(&self, camera_id: &str, points: &[ZonePoint]) -> Result<CameraZone> {
        validate_points(camera_id, points)?;

        let mut zones = self.zones.write();
        let zone = zones
            .entry(camera_id.to_string())
            .and_modify(|z| {
                z.points = points.to_vec();
                z.is_active = true;
            })
            .or_insert_with(|| CameraZone {
                id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                camera_id: camera_id.to_string(),
                points: points.to_vec(),
                is_active: true,
            });
        Ok(zone.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<ZonePoint> {
        vec![
            ZonePoint { x: 0.0, y: 0.0 },
            ZonePoint { x: 640.0, y: 0.0 },
            ZonePoint { x: 640.0, y: 480.0 },
            ZonePoint { x: 0.0, y: 480.0 },
        ]
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces_points() {
        let repo = MemoryZoneRepository::new();
        let first = repo.upsert("cam-1", &square()).await.unwrap();
        assert_eq!(first.points.len(), 4);

        let triangle = &square()[..3];
        let second = repo.upsert("cam-1", triangle).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.points.len(), 3);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_get_missing() {
        let repo = MemoryZoneRepository::new();
        assert!(repo.get("cam-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_degenerate_polygon() {
        let repo = MemoryZoneRepository::new();
        let err = repo.upsert("cam-1", &square()[..2]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
