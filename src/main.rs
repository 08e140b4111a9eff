use std::sync::Arc;

use anyhow::{Context, Result};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::AppConfig;

mod app_state;
mod cloudinary;
mod compose;
mod config;
mod consts;
mod error;
mod gemini;
mod middleware;
mod replicate;
mod routes;
pub mod utils;

use app_state::AppState;

async fn main_impl(conf: AppConfig) -> Result<()> {
    let addr = conf.server.socket_addr()?;
    let shared_state = Arc::new(AppState::new(conf)?);

    let sentry_tower_layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::with_transaction());

    let app = routes::build_router(shared_state).layer(sentry_tower_layer);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    log::info!("listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn main() -> Result<()> {
    let conf = AppConfig::load()?;

    let _guard = conf.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: std::env::var("SENTRY_TRACES_SAMPLE_RATE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.2),
                send_default_pii: false,
                attach_stacktrace: true,
                before_send: Some(middleware::sentry_scrub::create_before_send()),
                ..Default::default()
            },
        ))
    });

    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,tower_http=warn,axum::rejection=warn,hyper=warn,reqwest=warn",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(main_impl(conf))
}
