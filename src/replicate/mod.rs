pub mod client;

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_state::AppState,
    error::{AppError, ErrorBody},
    utils::data_url::{strip_data_url_prefix, to_data_uri},
};

const DEFAULT_PLACEMENT_PROMPT: &str =
    "Hang the provided artwork on the main wall of the interior photo. Keep perspective, \
     lighting and shadows realistic. Do not alter the room.";

const DEMO_NOTE: &str =
    "Demo mode: Replicate is not configured, returning the interior as finalImage.";

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PlaceArtRequest {
    /// Interior photo, base64 with or without a `data:` prefix
    #[serde(rename = "interiorImage")]
    pub interior_image: Option<String>,
    /// Artwork, base64 with or without a `data:` prefix
    #[serde(rename = "artworkImage")]
    pub artwork_image: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PlaceArtResponse {
    pub ok: bool,
    /// `replicate` or `demo`
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
    /// URL of the generated composition
    #[serde(rename = "finalImageUrl", skip_serializing_if = "Option::is_none")]
    pub final_image_url: Option<String>,
    /// Bare base64 image (demo mode only)
    #[serde(rename = "finalImage", skip_serializing_if = "Option::is_none")]
    pub final_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub fn replicate_router<S>(state: Arc<AppState>) -> OpenApiRouter<S> {
    OpenApiRouter::new()
        .routes(routes!(place_art))
        .with_state(state)
}

/// Place an artwork into an interior photo with a generative model
#[utoipa::path(
    post,
    path = "/placeArt",
    request_body = PlaceArtRequest,
    tag = "mockups",
    responses(
        (status = 200, description = "Composition finished", body = PlaceArtResponse),
        (status = 400, description = "Missing images", body = ErrorBody),
        (status = 502, description = "Replicate error", body = ErrorBody),
        (status = 504, description = "Prediction did not finish in time", body = ErrorBody),
    )
)]
#[instrument(skip(state, payload))]
pub async fn place_art(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlaceArtRequest>, JsonRejection>,
) -> Result<Json<PlaceArtResponse>, AppError> {
    let Json(request) = payload?;

    let (Some(interior), Some(artwork)) = (
        request.interior_image.filter(|s| !s.is_empty()),
        request.artwork_image.filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::bad_request("Bad request").with_details(json!(
            "Both interiorImage and artworkImage are required (base64, data: prefix optional)."
        )));
    };

    let interior = strip_data_url_prefix(&interior);
    let artwork = strip_data_url_prefix(&artwork);

    info!(
        interior_len = interior.data.len(),
        artwork_len = artwork.data.len(),
        "placeArt request"
    );

    let Some(replicate) = state.replicate() else {
        return Ok(Json(PlaceArtResponse {
            ok: true,
            mode: "demo".to_string(),
            prediction_id: None,
            final_image_url: None,
            final_image: Some(interior.data.to_string()),
            note: Some(DEMO_NOTE.to_string()),
        }));
    };

    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLACEMENT_PROMPT.to_string());

    let input = json!({
        "image": to_data_uri(interior.mime_type.unwrap_or("image/png"), interior.data),
        "art_image": to_data_uri(artwork.mime_type.unwrap_or("image/png"), artwork.data),
        "prompt": prompt,
    });

    let prediction = replicate.create_prediction(input).await?;
    let prediction_id = prediction.id.clone();
    let final_image_url = replicate.wait_for_output(prediction).await?;

    info!("placeArt prediction {} finished", prediction_id);

    Ok(Json(PlaceArtResponse {
        ok: true,
        mode: "replicate".to_string(),
        prediction_id: Some(prediction_id),
        final_image_url: Some(final_image_url),
        final_image: None,
        note: None,
    }))
}
