use anyhow::Result;
use detection_log::config;
use detection_log::db::DatabaseService;
use detection_log::{HistoryLimits, RestApi};
use log::{error, info, warn};
use std::sync::Arc;

async fn run_app() -> Result<()> {
    let config = config::load_from_env()?;

    // Initialize logging; RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting detection log service");

    let database = DatabaseService::new(&config.database)?;
    database.init_schema().await;

    if !database.health_check().await? {
        warn!("Database is not reachable yet; requests will fail until it is");
    }

    let limits = HistoryLimits::from(&config.api);
    let store = Arc::new(database.detections(limits));

    let http_server = RestApi::new(&config.api, store);
    http_server
        .run(async {
            // Wait for termination signals
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    database.close().await;
    info!("Database pool closed");

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
