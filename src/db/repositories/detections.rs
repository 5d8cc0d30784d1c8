use crate::db::migrations;
use crate::db::models::{DetectionEvent, DetectionStats, NewDetectionEvent};
use crate::db::repositories::{DetectionStore, HistoryLimits};
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

/// Detections repository backed by PostgreSQL
#[derive(Clone)]
pub struct DetectionsRepository {
    pool: Arc<PgPool>,
    limits: HistoryLimits,
}

impl DetectionsRepository {
    /// Create a new detections repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            limits: HistoryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: HistoryLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[async_trait]
impl DetectionStore for DetectionsRepository {
    async fn ensure_schema(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Database ping failed: {}", e)))?;

        Ok(())
    }

    async fn insert(&self, event: &NewDetectionEvent) -> Result<DetectionEvent> {
        // Bound as text and cast to JSON so the submitted key order survives
        let objects = serde_json::to_string(&event.objects).map_err(Error::from)?;

        let result = sqlx::query_as::<_, DetectionEvent>(
            r#"
            INSERT INTO detections (
                timestamp, source, objects, total_objects, unique_objects, avg_confidence, detected_objects
            )
            VALUES (COALESCE($1, NOW()), $2, $3::json, $4, $5, $6, $7)
            RETURNING id, timestamp, source, objects, total_objects, unique_objects,
                      avg_confidence, detected_objects, created_at
            "#,
        )
        .bind(event.timestamp)
        .bind(&event.source)
        .bind(objects)
        .bind(event.summary.total_objects)
        .bind(event.summary.unique_objects)
        .bind(event.summary.avg_confidence)
        .bind(&event.summary.detected_objects)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert detection: {}", e)))?;

        info!(
            "Stored detection {} from {}: {}",
            result.id, result.source, result.detected_objects
        );

        Ok(result)
    }

    async fn list_recent(&self, limit: Option<i64>) -> Result<Vec<DetectionEvent>> {
        let limit = self.limits.resolve(limit);
        debug!("Listing {} most recent detections", limit);

        let result = sqlx::query_as::<_, DetectionEvent>(
            r#"
            SELECT id, timestamp, source, objects, total_objects, unique_objects,
                   avg_confidence, detected_objects, created_at
            FROM detections
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to list detections: {}", e)))?;

        Ok(result)
    }

    async fn aggregate_stats(&self) -> Result<DetectionStats> {
        let result = sqlx::query_as::<_, DetectionStats>(
            r#"
            SELECT
                COUNT(*) AS total_detections,
                COALESCE(SUM(total_objects), 0)::BIGINT AS total_objects_detected,
                ROUND(AVG(avg_confidence)::NUMERIC, 2)::FLOAT8 AS overall_avg_confidence,
                MAX(total_objects) AS max_objects_in_detection
            FROM detections
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to aggregate detection stats: {}", e)))?;

        Ok(result)
    }

    async fn delete_all(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM detections")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete detections: {}", e)))?;

        info!("Deleted {} detections", result.rows_affected());

        Ok(())
    }
}
