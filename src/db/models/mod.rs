pub mod detection_models;

pub use detection_models::{
    DetectedObject, DetectionEvent, DetectionStats, DetectionSummary, NewDetectionEvent,
    DEFAULT_SOURCE,
};
