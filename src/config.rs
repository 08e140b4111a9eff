use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::consts::{
    CLOUDINARY_API_URL, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_REQUEST_BODY_LIMIT,
    GEMINI_API_URL, GEMINI_DEFAULT_MODEL, GEMINI_DEFAULT_TEMPERATURE, MAX_INLINE_IMAGE_BASE64_LEN,
    MAX_OUTPUT_PIXELS, MAX_REMOTE_IMAGE_BYTES, REPLICATE_API_URL, REPLICATE_POLL_INTERVAL_MS,
    REPLICATE_POLL_TIMEOUT_SECS,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Flat variables used by the original serverless deployment, mapped onto
/// their nested keys. They win over `config.toml` and `APP_*` variables.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("ALLOWED_ORIGIN", "server.allowed_origin"),
    ("SENTRY_DSN", "sentry_dsn"),
    ("CLOUDINARY_CLOUD_NAME", "cloudinary.cloud_name"),
    ("CLOUDINARY_UPLOAD_PRESET", "cloudinary.upload_preset"),
    ("CLOUDINARY_API_KEY", "cloudinary.api_key"),
    ("CLOUDINARY_API_SECRET", "cloudinary.api_secret"),
    ("REPLICATE_API_TOKEN", "replicate.api_token"),
    ("REPLICATE_MODEL_VERSION", "replicate.model_version"),
    ("GEMINI_API_KEY", "gemini.api_key"),
];

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub cloudinary: CloudinaryConfig,
    pub replicate: ReplicateConfig,
    pub gemini: GeminiConfig,
    pub sentry_dsn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` keeps the permissive CORS policy
    pub allowed_origin: Option<String>,
    pub request_body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            allowed_origin: None,
            request_body_limit_bytes: DEFAULT_REQUEST_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_remote_image_bytes: usize,
    pub max_inline_image_base64_len: usize,
    pub fetch_timeout_secs: u64,
    pub max_output_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_remote_image_bytes: MAX_REMOTE_IMAGE_BYTES,
            max_inline_image_base64_len: MAX_INLINE_IMAGE_BASE64_LEN,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_output_pixels: MAX_OUTPUT_PIXELS,
        }
    }
}

impl LimitsConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudinaryConfig {
    pub api_base: String,
    pub cloud_name: Option<String>,
    pub upload_preset: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub signature_algorithm: SignatureAlgorithm,
    /// Folder applied to every upload unless the request names one
    pub folder: Option<String>,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            api_base: CLOUDINARY_API_URL.to_string(),
            cloud_name: None,
            upload_preset: None,
            api_key: None,
            api_secret: None,
            signature_algorithm: SignatureAlgorithm::default(),
            folder: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub model_version: Option<String>,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: REPLICATE_API_URL.to_string(),
            api_token: None,
            model_version: None,
            poll_interval_ms: REPLICATE_POLL_INTERVAL_MS,
            poll_timeout_secs: REPLICATE_POLL_TIMEOUT_SECS,
        }
    }
}

impl ReplicateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub temperature: f64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: GEMINI_API_URL.to_string(),
            api_key: None,
            default_model: GEMINI_DEFAULT_MODEL.to_string(),
            temperature: GEMINI_DEFAULT_TEMPERATURE,
        }
    }
}

impl AppConfig {
    /// Load from `config.toml` (or `APP_CONFIG_PATH`), `APP_*` variables and
    /// the legacy flat variables, in increasing order of precedence.
    pub fn load() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let path = vars
            .get("APP_CONFIG_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&path, vars)
    }

    pub fn load_from(path: &str, vars: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = vars
                .get(*var)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            builder = builder.set_override_option(*key, value)?;
        }

        let conf: AppConfig = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("failed to parse configuration")?;

        Ok(conf)
    }
}
