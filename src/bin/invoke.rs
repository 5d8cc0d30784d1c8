//! Function-per-request entry point.
//!
//! Reads one invocation event (JSON) from stdin, dispatches it through the
//! shared router and prints the response JSON to stdout. Set
//! `FUNCTION_MOUNT_PREFIX` to the path the host mounts the function under.

use anyhow::{Context, Result};
use detection_log::api::invocation::{self, InvocationEvent};
use detection_log::config;
use detection_log::db::DatabaseService;
use detection_log::{router, AppState, Error, HistoryLimits};
use std::io::Read;
use std::sync::Arc;

async fn invoke() -> Result<invocation::InvocationResponse> {
    let config = config::load_from_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .target(env_logger::Target::Stderr)
    .init();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read invocation event from stdin")?;
    let event: InvocationEvent = serde_json::from_str(&input)
        .map_err(|e| Error::Validation(format!("Invalid invocation event: {}", e)))?;

    let database = DatabaseService::new(&config.database)?;
    database.init_schema().await;

    let limits = HistoryLimits::from(&config.api);
    let state = AppState::new(Arc::new(database.detections(limits)));
    let app = router(state, None);

    let mount_prefix = std::env::var("FUNCTION_MOUNT_PREFIX").ok();
    let response = invocation::handle(app, event, mount_prefix.as_deref()).await;

    database.close().await;
    response
}

#[tokio::main]
async fn main() {
    let response = match invoke().await {
        Ok(response) => response,
        Err(e) => {
            log::error!("Invocation failed: {:#}", e);
            invocation::error_response(&e)
        }
    };

    match serde_json::to_string(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to encode response: {}", e);
            std::process::exit(1);
        }
    }
}
