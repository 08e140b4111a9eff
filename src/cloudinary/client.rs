use std::collections::BTreeMap;

use axum::http::StatusCode;
use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::info;
use utoipa::ToSchema;

use crate::config::{CloudinaryConfig, SignatureAlgorithm};
use crate::error::AppError;

/// How an upload is authorised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAuth<'a> {
    /// Unsigned upload through a preset configured in the Cloudinary console
    Unsigned { upload_preset: &'a str },
    /// Upload signed with the account's API secret
    Signed {
        api_key: &'a str,
        api_secret: &'a str,
        upload_preset: Option<&'a str>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub folder: Option<String>,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: Option<String>,
}

pub struct CloudinaryClient<'a> {
    http_client: &'a reqwest::Client,
    config: &'a CloudinaryConfig,
}

impl<'a> CloudinaryClient<'a> {
    pub fn new(http_client: &'a reqwest::Client, config: &'a CloudinaryConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Signed credentials take priority over an unsigned preset
    pub fn auth(&self) -> Option<UploadAuth<'a>> {
        let config = self.config;
        let upload_preset = non_empty(&config.upload_preset);

        match (non_empty(&config.api_key), non_empty(&config.api_secret)) {
            (Some(api_key), Some(api_secret)) => Some(UploadAuth::Signed {
                api_key,
                api_secret,
                upload_preset,
            }),
            _ => upload_preset.map(|upload_preset| UploadAuth::Unsigned { upload_preset }),
        }
    }

    pub fn cloud_name(&self) -> Option<&'a str> {
        non_empty(&self.config.cloud_name)
    }

    pub fn is_configured(&self) -> bool {
        self.cloud_name().is_some() && self.auth().is_some()
    }

    /// Upload a `data:` URI (or any URL Cloudinary can fetch) as an image asset
    pub async fn upload(
        &self,
        file: String,
        options: &UploadOptions,
    ) -> Result<UploadedAsset, AppError> {
        let (Some(cloud_name), Some(auth)) = (self.cloud_name(), self.auth()) else {
            return Err(AppError::Misconfigured(
                "Cloudinary env vars missing".to_string(),
            ));
        };

        let folder = options.folder.clone().or_else(|| self.config.folder.clone());
        let form = build_form(
            file,
            &auth,
            folder,
            options.public_id.clone(),
            self.config.signature_algorithm,
            chrono::Utc::now().timestamp(),
        );

        let upload_url = format!(
            "{}/{}/image/upload",
            self.config.api_base.trim_end_matches('/'),
            cloud_name
        );

        info!(
            "Uploading image to Cloudinary cloud {} ({})",
            cloud_name,
            match auth {
                UploadAuth::Signed { .. } => "signed",
                UploadAuth::Unsigned { .. } => "unsigned",
            }
        );

        let response = self
            .http_client
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                AppError::upstream(
                    StatusCode::BAD_GATEWAY,
                    format!("Cloudinary upload request failed: {e}"),
                )
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let json: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let secure_url = json.get("secure_url").and_then(Value::as_str);

        match secure_url {
            Some(url) if status.is_success() => {
                let public_id = json
                    .get("public_id")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                info!("Cloudinary upload stored as {:?}", public_id);

                Ok(UploadedAsset {
                    url: url.to_string(),
                    public_id,
                })
            }
            _ => {
                let message = json
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("Cloudinary upload failed")
                    .to_string();
                let status = if status.is_success() {
                    StatusCode::BAD_GATEWAY
                } else {
                    status
                };

                Err(AppError::upstream(status, message).with_details(json))
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn build_form(
    file: String,
    auth: &UploadAuth<'_>,
    folder: Option<String>,
    public_id: Option<String>,
    algorithm: SignatureAlgorithm,
    timestamp: i64,
) -> Form {
    let mut params: BTreeMap<&str, String> = BTreeMap::new();
    if let Some(folder) = folder {
        params.insert("folder", folder);
    }
    if let Some(public_id) = public_id {
        params.insert("public_id", public_id);
    }

    match auth {
        UploadAuth::Unsigned { upload_preset } => {
            params.insert("upload_preset", upload_preset.to_string());
        }
        UploadAuth::Signed {
            api_key,
            api_secret,
            upload_preset,
        } => {
            if let Some(preset) = upload_preset {
                params.insert("upload_preset", preset.to_string());
            }
            params.insert("timestamp", timestamp.to_string());
            let signature = sign_params(&params, api_secret, algorithm);
            params.insert("signature", signature);
            params.insert("api_key", api_key.to_string());
        }
    }

    params
        .into_iter()
        .fold(Form::new().text("file", file), |form, (key, value)| {
            form.text(key, value)
        })
}

/// Cloudinary request signature: the sorted `key=value` pairs joined by `&`,
/// followed by the API secret, hashed and hex encoded.
pub fn sign_params(
    params: &BTreeMap<&str, String>,
    api_secret: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    let to_sign = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let payload = format!("{to_sign}{api_secret}");

    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
    }
}
