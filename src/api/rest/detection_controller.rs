use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::{
    DetectedObject, DetectionEvent, DetectionStats, NewDetectionEvent, DEFAULT_SOURCE,
};
use crate::error::Error;
use crate::services::aggregation::summarize;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /detections`
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source: Option<String>,
    /// Capture instant as RFC 3339 or epoch milliseconds. Anything else is
    /// ignored and the store assigns the time.
    pub timestamp: Option<Value>,
    pub objects: Option<Vec<DetectedObject>>,
}

/// Query parameters of `GET /detections`
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthErrorResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub data: DetectionEvent,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<DetectionEvent>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: DetectionStats,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(_) => Json(HealthResponse {
            status: "ok",
            database: "connected",
            timestamp: Utc::now(),
        })
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthErrorResponse {
                    status: "error",
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `POST /detections`
pub async fn post_detection(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid detection payload")
            .with_details(rejection.body_text())
    })?;

    let objects = request.objects.unwrap_or_default();
    let summary = summarize(&objects)?;

    let source = request
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

    let event = NewDetectionEvent {
        source,
        timestamp: request.timestamp.as_ref().and_then(parse_timestamp),
        objects,
        summary,
    };

    let stored = state
        .store
        .insert(&event)
        .await
        .map_err(|e| ApiError::from(e).during("Failed to save detection"))?;

    Ok(Json(IngestResponse {
        success: true,
        message: "Detection saved successfully".to_string(),
        data: stored,
    }))
}

/// `GET /detections?limit=N`
pub async fn get_detections(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<HistoryResponse>> {
    let limit = parse_limit(params.limit.as_deref())?;

    let rows = state
        .store
        .list_recent(limit)
        .await
        .map_err(|e| ApiError::from(e).during("Failed to fetch detections"))?;

    Ok(Json(HistoryResponse {
        success: true,
        count: rows.len(),
        data: rows,
    }))
}

/// `GET /stats`
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state
        .store
        .aggregate_stats()
        .await
        .map_err(|e| ApiError::from(e).during("Failed to fetch statistics"))?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// `DELETE /detections`
pub async fn delete_detections(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state
        .store
        .delete_all()
        .await
        .map_err(|e| ApiError::from(e).during("Failed to delete detections"))?;

    info!("All detections deleted");

    Ok(Json(MessageResponse {
        success: true,
        message: "All detections deleted successfully".to_string(),
    }))
}

/// Any (method, path) pair without a handler
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    Error::NotFound(format!("Route not found: {} {}", method, uri.path())).into()
}

fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    let parsed = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    };

    if parsed.is_none() && !raw.is_null() {
        debug!("Ignoring unparseable timestamp {}", raw);
    }
    parsed
}

/// Blank means "use the default"; anything else must be an integer
fn parse_limit(raw: Option<&str>) -> ApiResult<Option<i64>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            ApiError::new(StatusCode::BAD_REQUEST, "limit must be an integer")
                .with_details(format!("got {:?}", value))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_limit_uses_default() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("  ")).unwrap(), None);
    }

    #[test]
    fn numeric_limit_is_passed_through() {
        assert_eq!(parse_limit(Some("25")).unwrap(), Some(25));
        assert_eq!(parse_limit(Some("-3")).unwrap(), Some(-3));
    }

    #[test]
    fn timestamps_accept_rfc3339_and_epoch_millis() {
        let expected = DateTime::parse_from_rfc3339("2023-11-14T22:13:20Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_timestamp(&json!(1_700_000_000_000i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000.4)), Some(expected));
        assert_eq!(parse_timestamp(&json!("2023-11-14T22:13:20Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2023-11-14T23:13:20+01:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2023-11-14 22:13:20")), Some(expected));
    }

    #[test]
    fn unusable_timestamps_fall_back_to_store_time() {
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
        assert_eq!(parse_timestamp(&json!({"ms": 1})), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
    }

    #[tokio::test]
    async fn unmatched_route_reports_method_and_path() {
        let err = not_found(Method::PATCH, Uri::from_static("/stats?x=1")).await;
        assert_eq!(err.status, 404);
        assert_eq!(err.error, "Route not found: PATCH /stats");
        assert!(err.details.is_none());
    }

    #[test]
    fn non_numeric_limit_is_rejected() {
        let err = parse_limit(Some("ten")).unwrap_err();
        assert_eq!(err.status, 400);
    }
}
