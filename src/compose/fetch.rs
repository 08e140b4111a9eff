use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::Client;

use crate::error::AppError;

/// Download a remote image, refusing anything larger than `max_bytes`
pub async fn fetch_image(
    client: &Client,
    url: &str,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Bytes, AppError> {
    let mut response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(format!("Timed out fetching {}", short_url(url)))
            } else {
                AppError::upstream(
                    StatusCode::BAD_GATEWAY,
                    format!("Failed to fetch {}: {e}", short_url(url)),
                )
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::upstream(
            status,
            format!("Failed to fetch {}: HTTP {status}", short_url(url)),
        ));
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(too_large(url, max_bytes));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        AppError::upstream(
            StatusCode::BAD_GATEWAY,
            format!("Failed to read {}: {e}", short_url(url)),
        )
    })? {
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large(url, max_bytes));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(body))
}

fn too_large(url: &str, max_bytes: usize) -> AppError {
    AppError::PayloadTooLarge(format!(
        "Remote image {} exceeds {} bytes",
        short_url(url),
        max_bytes
    ))
}

/// First 60 characters, for logs and error messages
pub fn short_url(url: &str) -> &str {
    url.char_indices()
        .nth(60)
        .map(|(idx, _)| &url[..idx])
        .unwrap_or(url)
}
