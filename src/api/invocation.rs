//! Per-invocation hosting: one serverless-style event in, one response out,
//! dispatched through the same [`router`](crate::api::rest::router) the
//! persistent listener serves.

use crate::error::Error;
use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tower::ServiceExt;

/// Inbound event as delivered by a function host
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Strip the host's mount prefix and any trailing slash, leaving the logical
/// path the router matches on.
pub fn logical_path(raw: &str, mount_prefix: Option<&str>) -> String {
    let mut path = raw.trim();
    if let Some(prefix) = mount_prefix.map(|p| p.trim_end_matches('/')) {
        if !prefix.is_empty() {
            if let Some(rest) = path.strip_prefix(prefix) {
                if rest.is_empty() || rest.starts_with('/') {
                    path = rest;
                }
            }
        }
    }

    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn build_request(event: InvocationEvent, mount_prefix: Option<&str>) -> Result<Request<Body>> {
    let method = Method::from_bytes(event.http_method.to_uppercase().as_bytes())
        .map_err(|_| Error::Validation(format!("Invalid HTTP method: {}", event.http_method)))?;

    let mut uri = logical_path(&event.path, mount_prefix);
    if let Some(params) = event.query_string_parameters.filter(|p| !p.is_empty()) {
        let mut params: Vec<_> = params.into_iter().collect();
        params.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        uri.push('?');
        uri.push_str(&query);
    }

    let mut builder = Request::builder().method(method).uri(uri);
    let headers = event.headers.unwrap_or_default();
    let has_content_type = headers
        .keys()
        .any(|k| k.eq_ignore_ascii_case(header::CONTENT_TYPE.as_str()));

    for (name, value) in &headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Validation(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Validation(format!("Invalid value for header {}", name.as_str())))?;
        builder = builder.header(name, value);
    }

    let body = event.body.unwrap_or_default();
    if !body.is_empty() && !has_content_type {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }

    let request = builder
        .body(Body::from(body))
        .map_err(|e| Error::Validation(format!("Invalid request: {}", e)))?;

    Ok(request)
}

/// Dispatch one event through `router`
pub async fn handle(
    router: Router,
    event: InvocationEvent,
    mount_prefix: Option<&str>,
) -> Result<InvocationResponse> {
    let request = build_request(event, mount_prefix)?;

    let response = match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let status_code = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| Error::Internal(format!("Failed to read response body: {}", e)))?;

    Ok(InvocationResponse {
        status_code,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Turn a failure to even build the request into a response the host can return
pub fn error_response(err: &anyhow::Error) -> InvocationResponse {
    let status_code = match err.downcast_ref::<Error>() {
        Some(Error::Validation(_)) => 400,
        _ => 500,
    };

    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("access-control-allow-origin".to_string(), "*".to_string());

    InvocationResponse {
        status_code,
        headers,
        body: serde_json::json!({ "error": err.to_string() }).to_string(),
    }
}
