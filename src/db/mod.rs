use crate::config::DatabaseConfig;
use crate::db::repositories::{DetectionStore, DetectionsRepository, HistoryLimits};
use crate::error::Error;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub mod migrations;
pub mod models;
pub mod repositories;

/// Database service for handling connections and migrations
pub struct DatabaseService {
    pub pool: Arc<PgPool>,
    config: DatabaseConfig,
}

impl DatabaseService {
    /// Create a new database service.
    ///
    /// The pool connects lazily, so the service starts even when the
    /// database is down; requests then fail with a storage error.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing Database service");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)
            .map_err(|e| Error::Config(format!("Invalid database URL: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            config: config.clone(),
        })
    }

    /// Run database migrations if configured.
    ///
    /// Failures are logged, not returned: the service keeps starting and
    /// later operations report the storage error.
    pub async fn init_schema(&self) {
        if !self.config.auto_migrate {
            info!("Automatic migrations disabled");
            return;
        }

        info!("Running database migrations");
        match migrations::run_migrations(&self.pool).await {
            Ok(_) => info!("Database migrations completed successfully"),
            Err(e) => error!("Failed to run migrations: {}", e),
        }
    }

    /// Repository over this pool
    pub fn detections(&self, limits: HistoryLimits) -> DetectionsRepository {
        DetectionsRepository::new(Arc::clone(&self.pool)).with_limits(limits)
    }

    /// Health check for database
    pub async fn health_check(&self) -> Result<bool> {
        match self.detections(HistoryLimits::default()).ping().await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
