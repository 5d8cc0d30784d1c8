use crate::db::models::{DetectionEvent, DetectionStats, NewDetectionEvent};
use crate::db::repositories::{DetectionStore, HistoryLimits};
use crate::error::Error;
use crate::services::aggregation::round2;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A fake in-memory implementation of DetectionStore for testing
pub struct FakeDetectionStore {
    rows: Arc<RwLock<Vec<DetectionEvent>>>,
    failing: AtomicBool,
    limits: HistoryLimits,
}

impl FakeDetectionStore {
    pub fn new() -> Self {
        FakeDetectionStore {
            rows: Arc::new(RwLock::new(Vec::new())),
            failing: AtomicBool::new(false),
            limits: HistoryLimits::default(),
        }
    }

    /// Make every subsequent call fail as if the database were down
    pub fn fake_set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fake_len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("connection refused".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl DetectionStore for FakeDetectionStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.check()
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn insert(&self, event: &NewDetectionEvent) -> Result<DetectionEvent> {
        self.check()?;

        let mut rows = self.rows.write().unwrap();
        let now = Utc::now();
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let row = DetectionEvent {
            id,
            timestamp: event.timestamp.unwrap_or(now),
            source: event.source.clone(),
            objects: event.objects.clone(),
            total_objects: event.summary.total_objects,
            unique_objects: event.summary.unique_objects,
            avg_confidence: event.summary.avg_confidence,
            detected_objects: event.summary.detected_objects.clone(),
            created_at: now,
        };
        rows.push(row.clone());

        Ok(row)
    }

    async fn list_recent(&self, limit: Option<i64>) -> Result<Vec<DetectionEvent>> {
        self.check()?;

        let limit = self.limits.resolve(limit) as usize;
        let mut rows = self.rows.read().unwrap().clone();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(limit);

        Ok(rows)
    }

    async fn aggregate_stats(&self) -> Result<DetectionStats> {
        self.check()?;

        let rows = self.rows.read().unwrap();
        if rows.is_empty() {
            return Ok(DetectionStats::default());
        }

        let sum_confidence: f64 = rows.iter().map(|r| r.avg_confidence).sum();
        Ok(DetectionStats {
            total_detections: rows.len() as i64,
            total_objects_detected: rows.iter().map(|r| r.total_objects as i64).sum(),
            overall_avg_confidence: Some(round2(sum_confidence / rows.len() as f64)),
            max_objects_in_detection: rows.iter().map(|r| r.total_objects).max(),
        })
    }

    async fn delete_all(&self) -> Result<()> {
        self.check()?;
        self.rows.write().unwrap().clear();
        Ok(())
    }
}
