use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::Instrument;

use crate::error::AppError;

/// Maximum size of request/response body kept for breadcrumbs (default: 10KB)
const DEFAULT_BODY_LIMIT: usize = 10 * 1024;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const BODY_TOO_LARGE: &str = "Request body too large";

/// Field names whose values are credentials
pub const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "authorization",
    "bearer",
    "token",
    "api_key",
    "api_secret",
    "secret",
    "signature",
    "password",
    "access_token",
];

/// Field names carrying base64 images; replaced by their length
const BULK_FIELD_NAMES: &[&str] = &[
    "imagebase64",
    "image_base64",
    "interiorimage",
    "artworkimage",
    "finalimage",
    "inline_data",
];

fn get_body_limit() -> usize {
    std::env::var("HTTP_LOG_BODY_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_BODY_LIMIT)
}

fn should_capture_body(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ct.contains("json") || ct.contains("text"),
        None => false,
    }
}

/// Logs every request and records it as a Sentry breadcrumb.
/// Request bodies larger than `max_body_bytes` are refused with a JSON 413,
/// whether they declare a `Content-Length` or arrive chunked. Bodies are only
/// scrubbed into the breadcrumb for responses with status >= 400.
pub async fn http_logging_middleware(
    State(max_body_bytes): State<usize>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("http", %method, path = %uri.path(), %request_id);

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let declared_len = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let buffered = match declared_len {
        Some(len) if len > max_body_bytes as u64 => {
            Err(AppError::PayloadTooLarge(BODY_TOO_LARGE.to_string()))
        }
        _ if should_capture_body(content_type.as_deref()) => {
            buffer_request_body_bytes(req, max_body_bytes).await
        }
        _ => Ok((req, None)),
    };

    let (mut res, request_body_bytes) = match buffered {
        Ok((req, request_body_bytes)) => (
            next.run(req).instrument(span.clone()).await,
            request_body_bytes,
        ),
        Err(e) => (span.in_scope(|| e.into_response()), None),
    };

    let status = res.status();
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        tracing::info!(status = status.as_u16(), duration_ms, "request finished");
    });

    if status.as_u16() < 400 {
        add_breadcrumb(
            method.as_str(),
            uri.path(),
            status.as_u16(),
            duration_ms,
            None,
            None,
        );
        return res;
    }

    let request_body = request_body_bytes.as_ref().and_then(parse_and_scrub_bytes);

    let response_content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let (res, response_body_bytes) = if should_capture_body(response_content_type.as_deref()) {
        match buffer_response_body_bytes(res).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Failed to buffer response body: {}", e);
                return AppError::Internal(anyhow::anyhow!("Failed to process response"))
                    .into_response();
            }
        }
    } else {
        (res, None)
    };

    let response_body = response_body_bytes.as_ref().and_then(parse_and_scrub_bytes);

    add_breadcrumb(
        method.as_str(),
        uri.path(),
        status.as_u16(),
        duration_ms,
        request_body.as_deref(),
        response_body.as_deref(),
    );

    res
}

/// Buffers at most `max_bytes` of the request body so it can be replayed
/// to the handler and scrubbed into a breadcrumb
async fn buffer_request_body_bytes(
    req: Request,
    max_bytes: usize,
) -> Result<(Request, Option<Bytes>), AppError> {
    let (parts, body) = req.into_parts();

    let bytes = Limited::new(body, max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                AppError::PayloadTooLarge(BODY_TOO_LARGE.to_string())
            } else {
                AppError::bad_request("Failed to read request body")
                    .with_details(Value::String(e.to_string()))
            }
        })?
        .to_bytes();

    let kept = (!bytes.is_empty()).then(|| bytes.clone());
    Ok((Request::from_parts(parts, Body::from(bytes)), kept))
}

async fn buffer_response_body_bytes(
    res: Response,
) -> Result<(Response, Option<Bytes>), Box<dyn std::error::Error>> {
    let (parts, body) = res.into_parts();

    let bytes = body
        .collect()
        .await
        .map_err(|e| format!("Failed to read response body: {}", e))?
        .to_bytes();

    let kept = (!bytes.is_empty()).then(|| bytes.clone());
    Ok((Response::from_parts(parts, Body::from(bytes)), kept))
}

/// Request bodies here are mostly base64 images, so JSON is scrubbed from
/// the full body before truncating; this keeps the field structure intact.
fn parse_and_scrub_bytes(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let body_str = match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => return Some(format!("[Binary data, {} bytes]", bytes.len())),
    };

    let scrubbed = scrub_body(body_str);
    let limit = get_body_limit();
    if scrubbed.len() > limit {
        let cut = scrubbed
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(scrubbed.len());
        Some(format!("{}... [truncated]", &scrubbed[..cut]))
    } else {
        Some(scrubbed)
    }
}

fn add_breadcrumb(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: u64,
    request_body: Option<&str>,
    response_body: Option<&str>,
) {
    let mut data = BTreeMap::new();
    data.insert("method".to_string(), serde_json::json!(method));
    data.insert("url".to_string(), serde_json::json!(path));
    data.insert("status_code".to_string(), serde_json::json!(status));
    data.insert("duration_ms".to_string(), serde_json::json!(duration_ms));
    if let Some(body) = request_body {
        data.insert("request_body".to_string(), serde_json::json!(body));
    }
    if let Some(body) = response_body {
        data.insert("response_body".to_string(), serde_json::json!(body));
    }

    let level = if status >= 500 {
        sentry::Level::Error
    } else if status >= 400 {
        sentry::Level::Warning
    } else {
        sentry::Level::Info
    };

    sentry::add_breadcrumb(sentry::Breadcrumb {
        ty: "http".to_string(),
        category: Some("http.request".to_string()),
        message: Some(format!("{} {} {} ({}ms)", method, path, status, duration_ms)),
        data: data.into_iter().collect(),
        level,
        ..Default::default()
    });
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_FIELD_NAMES.iter().any(|field| key.contains(field))
}

fn is_bulk_key(key: &str) -> bool {
    let key = key.to_lowercase();
    BULK_FIELD_NAMES.iter().any(|field| key == *field)
}

/// Redact credentials and collapse base64 payloads. Non-JSON bodies are
/// returned as-is unless they mention a sensitive field.
fn scrub_body(body: &str) -> String {
    if let Ok(mut json) = serde_json::from_str::<Value>(body) {
        scrub_json_value(&mut json);
        serde_json::to_string(&json).unwrap_or_else(|_| "[Failed to serialize]".to_string())
    } else if SENSITIVE_FIELD_NAMES
        .iter()
        .any(|field| body.to_lowercase().contains(field))
    {
        "[REDACTED - Contains sensitive data]".to_string()
    } else {
        body.to_string()
    }
}

fn scrub_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *v = serde_json::json!("[REDACTED]");
                } else if is_bulk_key(key) {
                    *v = match v.as_str().map(str::len) {
                        Some(len) => serde_json::json!(format!("[{} chars]", len)),
                        None => serde_json::json!("[OMITTED]"),
                    };
                } else {
                    scrub_json_value(v);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                scrub_json_value(item);
            }
        }
        _ => {}
    }
}
