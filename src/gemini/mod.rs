pub mod client;

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_state::AppState,
    error::{AppError, ErrorBody},
    utils::data_url::strip_image_data_url_prefix,
};
use client::{extract_text, InlineData, Part};

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProcessImageRequest {
    /// Ignored unless it is a string
    #[schema(value_type = Option<String>)]
    pub prompt: Option<Value>,
    #[serde(rename = "imageBase64")]
    pub image_base64: Option<String>,
    /// Gemini model, `models/` prefix optional
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProcessImageResponse {
    pub ok: bool,
    pub model: String,
    pub text: String,
    /// Unmodified Gemini response
    #[schema(value_type = Object)]
    pub raw: Value,
}

pub fn gemini_router<S>(state: Arc<AppState>) -> OpenApiRouter<S> {
    OpenApiRouter::new()
        .routes(routes!(process_image))
        .with_state(state)
}

/// Ask Gemini about a prompt and/or an image
#[utoipa::path(
    post,
    path = "/processImage",
    request_body = ProcessImageRequest,
    tag = "gemini",
    responses(
        (status = 200, description = "Gemini answered", body = ProcessImageResponse),
        (status = 400, description = "Neither prompt nor image supplied", body = ErrorBody),
        (status = 413, description = "Image too large", body = ErrorBody),
        (status = 500, description = "GEMINI_API_KEY missing", body = ErrorBody),
    )
)]
#[instrument(skip(state, payload))]
pub async fn process_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Result<Json<ProcessImageResponse>, AppError> {
    let Json(request) = payload?;

    let gemini = state.gemini();
    if !gemini.is_configured() {
        return Err(AppError::Misconfigured(
            "Server misconfiguration: GEMINI_API_KEY is missing".to_string(),
        ));
    }

    let prompt = request
        .prompt
        .as_ref()
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty());
    let image = request.image_base64.as_deref().filter(|i| !i.is_empty());

    if prompt.is_none() && image.is_none() {
        return Err(AppError::bad_request(
            "Empty input. Provide prompt and/or imageBase64.",
        ));
    }

    if let Some(image) = image {
        if image.len() > state.config.limits.max_inline_image_base64_len {
            return Err(AppError::PayloadTooLarge(
                "Image too large. Please keep it under ~8-10MB base64.".to_string(),
            ));
        }
    }

    let mut parts = Vec::with_capacity(2);
    if let Some(prompt) = prompt {
        parts.push(Part::Text {
            text: prompt.to_string(),
        });
    }
    if let Some(image) = image {
        let inline = strip_image_data_url_prefix(image);
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: inline.mime_type.unwrap_or("image/png").to_string(),
                data: inline.data.to_string(),
            },
        });
    }

    let model = gemini.normalize_model_name(request.model.as_deref());
    let raw = gemini.generate_content(&model, parts).await?;

    Ok(Json(ProcessImageResponse {
        ok: true,
        text: extract_text(&raw),
        model,
        raw,
    }))
}
