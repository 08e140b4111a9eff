pub mod client;

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_state::AppState,
    error::{AppError, ErrorBody},
    utils::data_url::{payload_after_comma, to_data_uri},
};
use client::UploadOptions;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveMockupRequest {
    /// Base64 PNG, with or without a `data:` prefix
    #[serde(rename = "imageBase64")]
    pub image_base64: Option<String>,
    pub folder: Option<String>,
    pub public_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveMockupResponse {
    pub url: String,
    pub public_id: Option<String>,
}

pub fn cloudinary_router<S>(state: Arc<AppState>) -> OpenApiRouter<S> {
    OpenApiRouter::new()
        .routes(routes!(save_mockup))
        .with_state(state)
}

/// Store a finished mockup in Cloudinary
#[utoipa::path(
    post,
    path = "/saveMockup",
    request_body = SaveMockupRequest,
    tag = "mockups",
    responses(
        (status = 200, description = "Image stored", body = SaveMockupResponse),
        (status = 400, description = "Missing or invalid image", body = ErrorBody),
        (status = 500, description = "Cloudinary not configured", body = ErrorBody),
        (status = 502, description = "Cloudinary rejected the upload", body = ErrorBody),
    )
)]
#[instrument(skip(state, payload))]
pub async fn save_mockup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveMockupRequest>, JsonRejection>,
) -> Result<Json<SaveMockupResponse>, AppError> {
    let Json(request) = payload?;

    let Some(image_base64) = request.image_base64.filter(|s| !s.is_empty()) else {
        return Err(AppError::bad_request("imageBase64 is required"));
    };

    let cloudinary = state.cloudinary();
    if !cloudinary.is_configured() {
        return Err(AppError::Misconfigured(
            "Cloudinary env vars missing".to_string(),
        ));
    }

    let base64_data = payload_after_comma(&image_base64);

    let asset = cloudinary
        .upload(
            to_data_uri("image/png", base64_data),
            &UploadOptions {
                folder: request.folder,
                public_id: request.public_id,
            },
        )
        .await?;

    Ok(Json(SaveMockupResponse {
        url: asset.url,
        public_id: asset.public_id,
    }))
}
