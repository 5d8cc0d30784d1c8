use crate::config::ApiConfig;
use crate::db::models::{DetectionEvent, DetectionStats, NewDetectionEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod detections;
#[cfg(test)]
pub mod fake;

pub use detections::DetectionsRepository;

/// Bounds applied to history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub default: i64,
    pub max: i64,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default: 50,
            max: 500,
        }
    }
}

impl From<&ApiConfig> for HistoryLimits {
    fn from(config: &ApiConfig) -> Self {
        Self {
            default: config.default_history_limit,
            max: config.max_history_limit,
        }
    }
}

impl HistoryLimits {
    /// Resolve a requested limit: `None` uses the default, anything else is
    /// clamped into `1..=max`.
    pub fn resolve(&self, requested: Option<i64>) -> i64 {
        let max = self.max.max(1);
        requested.unwrap_or(self.default).clamp(1, max)
    }
}

/// Persistence for detection events.
///
/// Errors are `anyhow` values wrapping [`crate::error::Error::Storage`].
#[async_trait]
pub trait DetectionStore: Send + Sync + 'static {
    /// Create the schema if missing; safe to call repeatedly and concurrently
    async fn ensure_schema(&self) -> Result<()>;

    /// Round-trip to the store
    async fn ping(&self) -> Result<()>;

    /// Write one event and return the stored row
    async fn insert(&self, event: &NewDetectionEvent) -> Result<DetectionEvent>;

    /// Most recent events first
    async fn list_recent(&self, limit: Option<i64>) -> Result<Vec<DetectionEvent>>;

    async fn aggregate_stats(&self) -> Result<DetectionStats>;

    /// Remove every stored event
    async fn delete_all(&self) -> Result<()>;
}

#[async_trait]
impl<T: DetectionStore + ?Sized> DetectionStore for Arc<T> {
    async fn ensure_schema(&self) -> Result<()> {
        (**self).ensure_schema().await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    async fn insert(&self, event: &NewDetectionEvent) -> Result<DetectionEvent> {
        (**self).insert(event).await
    }

    async fn list_recent(&self, limit: Option<i64>) -> Result<Vec<DetectionEvent>> {
        (**self).list_recent(limit).await
    }

    async fn aggregate_stats(&self) -> Result<DetectionStats> {
        (**self).aggregate_stats().await
    }

    async fn delete_all(&self) -> Result<()> {
        (**self).delete_all().await
    }
}
