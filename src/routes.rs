use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::instrument;
use utoipa::{OpenApi, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::consts::PUBLIC_ENDPOINTS;
use crate::{cloudinary, compose, gemini, replicate};

#[derive(OpenApi)]
#[openapi(
    info(title = "art-tryon-agent", description = "Artwork try-on and mockup API"),
    tags(
        (name = "mockups", description = "Compositing and storing artwork mockups"),
        (name = "gemini", description = "Multimodal prompts"),
    )
)]
struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct IndexResponse {
    pub ok: bool,
    pub endpoints: Vec<&'static str>,
}

/// Which Cloudinary settings the service sees; `null` when unset
#[derive(Serialize, ToSchema)]
pub struct PingResponse {
    pub ok: bool,
    #[serde(rename = "CLOUDINARY_CLOUD_NAME")]
    pub cloudinary_cloud_name: Option<String>,
    #[serde(rename = "CLOUDINARY_UPLOAD_PRESET")]
    pub cloudinary_upload_preset: Option<String>,
    pub replicate_configured: bool,
    pub gemini_configured: bool,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.request_body_limit_bytes;

    let (api, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest(
            "/api",
            OpenApiRouter::new()
                .merge(compose::compose_router(state.clone()))
                .merge(cloudinary::cloudinary_router(state.clone()))
                .merge(replicate::replicate_router(state.clone()))
                .merge(gemini::gemini_router(state.clone())),
        )
        .split_for_parts();

    Router::new()
        .route("/", get(index_handler))
        .route("/api", get(index_handler))
        .route("/api/ping", get(ping_handler))
        .route("/healthz", get(health_handler))
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(state.config.server.allowed_origin.as_deref()))
        .layer(axum::middleware::from_fn_with_state(
            body_limit,
            crate::middleware::http_logging_middleware,
        ))
        .with_state(state)
}

/// Permissive unless a single origin is configured
fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = allowed_origin
        .filter(|o| *o != "*")
        .and_then(|o| HeaderValue::from_str(o).ok());

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
            .max_age(std::time::Duration::from_secs(86400)),
        None => CorsLayer::permissive(),
    }
}

#[instrument]
async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        ok: true,
        endpoints: PUBLIC_ENDPOINTS.to_vec(),
    })
}

async fn ping_handler(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let cloudinary = &state.config.cloudinary;

    Json(PingResponse {
        ok: true,
        cloudinary_cloud_name: cloudinary.cloud_name.clone(),
        cloudinary_upload_preset: cloudinary.upload_preset.clone(),
        replicate_configured: state.replicate().is_some(),
        gemini_configured: state.gemini().is_configured(),
    })
}
