pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-export main components for easier use
pub use api::rest::{router, AppState, RestApi};
pub use db::repositories::{DetectionStore, DetectionsRepository, HistoryLimits};
pub use error::Error;
