use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client as ReqwestClient;

use crate::cloudinary::client::CloudinaryClient;
use crate::config::AppConfig;
use crate::gemini::client::GeminiClient;
use crate::replicate::client::ReplicateClient;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Shared connection pool for every upstream call
    pub http_client: ReqwestClient,
}

impl AppState {
    pub fn new(app_config: AppConfig) -> Result<Self> {
        let http_client = init_http_client()?;

        Ok(AppState {
            config: app_config,
            http_client,
        })
    }

    pub fn cloudinary(&self) -> CloudinaryClient<'_> {
        CloudinaryClient::new(&self.http_client, &self.config.cloudinary)
    }

    /// `None` when no API token or model version is configured
    pub fn replicate(&self) -> Option<ReplicateClient<'_>> {
        ReplicateClient::from_config(&self.http_client, &self.config.replicate)
    }

    pub fn gemini(&self) -> GeminiClient<'_> {
        GeminiClient::new(&self.http_client, &self.config.gemini)
    }
}

fn init_http_client() -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")
}
