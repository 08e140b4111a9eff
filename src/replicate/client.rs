use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::info;

use crate::config::ReplicateConfig;
use crate::error::AppError;

#[derive(Serialize)]
pub struct ReplicatePredictionRequest<'a> {
    pub version: &'a str,
    pub input: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatePrediction {
    pub id: String,
    pub status: String,
    pub output: Option<Value>,
    pub error: Option<Value>,
}

impl ReplicatePrediction {
    /// Output can be a string URL or an array whose first element is one
    pub fn output_url(&self) -> Option<String> {
        let output = self.output.as_ref()?;
        if let Some(url) = output.as_str() {
            Some(url.to_string())
        } else if let Some(arr) = output.as_array() {
            arr.first().and_then(|v| v.as_str()).map(|s| s.to_string())
        } else {
            None
        }
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => format!("Prediction {}", self.status),
            Some(other) => other.to_string(),
        }
    }
}

pub struct ReplicateClient<'a> {
    http_client: &'a reqwest::Client,
    config: &'a ReplicateConfig,
    api_token: &'a str,
    model_version: &'a str,
}

impl<'a> ReplicateClient<'a> {
    pub fn from_config(http_client: &'a reqwest::Client, config: &'a ReplicateConfig) -> Option<Self> {
        let api_token = config.api_token.as_deref().filter(|t| !t.is_empty())?;
        let model_version = config.model_version.as_deref().filter(|v| !v.is_empty())?;

        Some(Self {
            http_client,
            config,
            api_token,
            model_version,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    pub async fn create_prediction(&self, input: Value) -> Result<ReplicatePrediction, AppError> {
        let request = ReplicatePredictionRequest {
            version: self.model_version,
            input,
        };

        let response = self
            .http_client
            .post(self.url("predictions"))
            .bearer_auth(self.api_token)
            .json(&request)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| {
                AppError::upstream(
                    StatusCode::BAD_GATEWAY,
                    format!("Failed to submit prediction: {e}"),
                )
            })?;

        let prediction = parse_prediction(response).await?;
        info!("Replicate prediction submitted with ID: {}", prediction.id);

        Ok(prediction)
    }

    pub async fn get_prediction(&self, prediction_id: &str) -> Result<ReplicatePrediction, AppError> {
        let response = self
            .http_client
            .get(self.url(&format!("predictions/{prediction_id}")))
            .bearer_auth(self.api_token)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| {
                AppError::upstream(
                    StatusCode::BAD_GATEWAY,
                    format!("Failed to check prediction status: {e}"),
                )
            })?;

        parse_prediction(response).await
    }

    /// Poll until the prediction reaches a terminal state and return its output URL
    pub async fn wait_for_output(
        &self,
        mut prediction: ReplicatePrediction,
    ) -> Result<String, AppError> {
        let deadline = Instant::now() + self.config.poll_timeout();
        let mut attempt: u32 = 0;

        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    return prediction.output_url().ok_or_else(|| {
                        AppError::upstream(
                            StatusCode::BAD_GATEWAY,
                            "Generation completed but no image URL found in output",
                        )
                    });
                }
                "failed" | "canceled" => {
                    return Err(AppError::upstream(
                        StatusCode::BAD_GATEWAY,
                        format!("Replicate prediction failed: {}", prediction.error_message()),
                    ));
                }
                "starting" | "processing" => {
                    if attempt > 0 && attempt % 10 == 0 {
                        info!(
                            "Replicate prediction {} still {} after {} polls",
                            prediction.id, prediction.status, attempt
                        );
                    }
                }
                other => {
                    // Unknown status, continue polling
                    info!("Unknown status: {}", other);
                }
            }

            if Instant::now() + self.config.poll_interval() > deadline {
                return Err(AppError::Timeout(format!(
                    "Replicate prediction {} did not finish within {}s",
                    prediction.id, self.config.poll_timeout_secs
                )));
            }

            tokio::time::sleep(self.config.poll_interval()).await;
            attempt += 1;
            prediction = self.get_prediction(&prediction.id).await?;
        }
    }
}

async fn parse_prediction(response: reqwest::Response) -> Result<ReplicatePrediction, AppError> {
    let status = response.status();

    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("Replicate API error")
            .to_string();
        return Err(AppError::upstream(status, message).with_details(body));
    }

    response.json().await.map_err(|e| {
        AppError::upstream(
            StatusCode::BAD_GATEWAY,
            format!("Failed to parse prediction response: {e}"),
        )
    })
}
