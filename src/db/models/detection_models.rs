use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source tag used when a batch does not name its feed
pub const DEFAULT_SOURCE: &str = "camera";

/// One detected object as submitted by the client.
///
/// Only `class` and `score` are interpreted. Every other field (bounding box,
/// track id, ...) is kept verbatim, in the order the client sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct DetectedObject {
    fields: Map<String, Value>,
}

impl DetectedObject {
    /// Build an object from a class label and a confidence score
    pub fn new(class: impl Into<String>, score: f64) -> Self {
        let mut fields = Map::new();
        fields.insert("class".to_string(), Value::String(class.into()));
        fields.insert("score".to_string(), Value::from(score));
        Self { fields }
    }

    /// Attach an opaque field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn class(&self) -> &str {
        self.fields
            .get("class")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn score(&self) -> f64 {
        self.fields
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or_default()
    }
}

impl TryFrom<Map<String, Value>> for DetectedObject {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get("class") {
            Some(Value::String(_)) => {}
            Some(_) => return Err("detected object `class` must be a string".to_string()),
            None => return Err("detected object is missing `class`".to_string()),
        }

        match fields.get("score").and_then(Value::as_f64) {
            Some(score) if score.is_finite() => {}
            Some(_) | None => {
                return Err("detected object `score` must be a number".to_string());
            }
        }

        Ok(Self { fields })
    }
}

impl From<DetectedObject> for Map<String, Value> {
    fn from(object: DetectedObject) -> Self {
        object.fields
    }
}

/// Derived fields computed from a batch before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSummary {
    pub total_objects: i32,
    pub unique_objects: i32,
    pub avg_confidence: f64,
    pub detected_objects: String,
}

/// Stored detection event, one row per ingested batch
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DetectionEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[sqlx(json)]
    pub objects: Vec<DetectedObject>,
    pub total_objects: i32,
    pub unique_objects: i32,
    pub avg_confidence: f64,
    pub detected_objects: String,
    pub created_at: DateTime<Utc>,
}

/// A batch ready to be written; `id` and `created_at` come from the store
#[derive(Debug, Clone)]
pub struct NewDetectionEvent {
    pub source: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub objects: Vec<DetectedObject>,
    pub summary: DetectionSummary,
}

/// Aggregates across every stored event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DetectionStats {
    pub total_detections: i64,
    pub total_objects_detected: i64,
    /// Mean of per-event `avg_confidence`; null when nothing is stored
    pub overall_avg_confidence: Option<f64>,
    /// Null when nothing is stored
    pub max_objects_in_detection: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_opaque_fields_in_submitted_order() {
        let raw = json!({"bbox": [1, 2, 3, 4], "class": "dog", "score": 0.7, "track": 9});
        let object: DetectedObject = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(object.class(), "dog");
        assert_eq!(object.score(), 0.7);
        assert_eq!(
            serde_json::to_string(&object).unwrap(),
            serde_json::to_string(&raw).unwrap()
        );
    }

    #[test]
    fn rejects_object_without_class() {
        let err = serde_json::from_value::<DetectedObject>(json!({"score": 0.4})).unwrap_err();
        assert!(err.to_string().contains("missing `class`"));
    }

    #[test]
    fn rejects_non_numeric_score() {
        assert!(serde_json::from_value::<DetectedObject>(json!({"class": "cat", "score": "high"})).is_err());
    }

    #[test]
    fn accepts_integer_score() {
        let object: DetectedObject = serde_json::from_value(json!({"class": "cat", "score": 1})).unwrap();
        assert_eq!(object.score(), 1.0);
    }
}
