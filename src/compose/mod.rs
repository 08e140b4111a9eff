pub mod compositor;
pub mod fetch;
pub mod geometry;

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_state::AppState,
    cloudinary::client::UploadOptions,
    error::{AppError, ErrorBody},
    utils::data_url::{is_http_url, to_data_uri},
};
use compositor::{compose_images, OutputFormat};
use fetch::{fetch_image, short_url};
use geometry::{Placement, PlacementParams};

#[derive(Deserialize, ToSchema)]
pub struct TryOnRequest {
    pub interior_url: Option<String>,
    pub art_url: Option<String>,
    #[serde(flatten)]
    pub placement: PlacementParams,
    #[serde(default)]
    pub format: OutputFormat,
    /// Also store the result in Cloudinary
    #[serde(default)]
    pub upload: bool,
}

#[derive(Serialize, ToSchema)]
pub struct TryOnResponse {
    pub ok: bool,
    pub mode: &'static str,
    pub image_base64: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

pub fn compose_router<S>(state: Arc<AppState>) -> OpenApiRouter<S> {
    OpenApiRouter::new()
        .routes(routes!(try_on))
        .with_state(state)
}

/// Composite an artwork onto an interior photo
#[utoipa::path(
    post,
    path = "/tryOn",
    request_body = TryOnRequest,
    tag = "mockups",
    responses(
        (status = 200, description = "Composited image", body = TryOnResponse),
        (status = 400, description = "Missing or non-http(s) URLs", body = ErrorBody),
        (status = 413, description = "Remote image too large", body = ErrorBody),
        (status = 415, description = "Body is not JSON", body = ErrorBody),
        (status = 422, description = "Remote file is not a decodable image, or the resized art is too large", body = ErrorBody),
    )
)]
#[instrument(skip(state, payload))]
pub async fn try_on(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TryOnRequest>, JsonRejection>,
) -> Result<Json<TryOnResponse>, AppError> {
    let Json(request) = payload?;

    let (Some(interior_url), Some(art_url)) = (
        request.interior_url.filter(|u| !u.is_empty()),
        request.art_url.filter(|u| !u.is_empty()),
    ) else {
        return Err(AppError::bad_request(
            "interior_url and art_url are required",
        ));
    };

    if !is_http_url(&interior_url) || !is_http_url(&art_url) {
        return Err(AppError::bad_request(
            "Both interior_url and art_url must be http(s) URLs",
        ));
    }

    info!(
        interior = short_url(&interior_url),
        art = short_url(&art_url),
        "tryOn request"
    );

    let limits = &state.config.limits;
    let (interior_bytes, art_bytes) = tokio::try_join!(
        fetch_image(
            &state.http_client,
            &interior_url,
            limits.max_remote_image_bytes,
            limits.fetch_timeout(),
        ),
        fetch_image(
            &state.http_client,
            &art_url,
            limits.max_remote_image_bytes,
            limits.fetch_timeout(),
        ),
    )?;

    let params = request.placement;
    let format = request.format;
    let max_pixels = limits.max_output_pixels;
    let composed = tokio::task::spawn_blocking(move || {
        compose_images(&interior_bytes, &art_bytes, &params, format, max_pixels)
    })
    .await
    .context("compositing task panicked")??;

    let image_base64 = BASE64.encode(&composed.bytes);

    let result_url = if request.upload {
        let asset = state
            .cloudinary()
            .upload(
                to_data_uri(composed.mime_type, &image_base64),
                &UploadOptions::default(),
            )
            .await?;
        Some(asset.url)
    } else {
        None
    };

    Ok(Json(TryOnResponse {
        ok: true,
        mode: "composite",
        image_base64,
        mime_type: composed.mime_type,
        width: composed.width,
        height: composed.height,
        placement: composed.placement,
        result_url,
    }))
}
