use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::GeminiConfig;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

pub struct GeminiClient<'a> {
    http_client: &'a reqwest::Client,
    config: &'a GeminiConfig,
}

impl<'a> GeminiClient<'a> {
    pub fn new(http_client: &'a reqwest::Client, config: &'a GeminiConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&'a str> {
        self.config.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Accepts `models/gemini-1.5-flash` as well as `gemini-1.5-flash`
    pub fn normalize_model_name(&self, requested: Option<&str>) -> String {
        let name = requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.default_model.as_str());
        name.strip_prefix("models/").unwrap_or(name).to_string()
    }

    /// Single-shot `generateContent` call; returns the raw response JSON
    pub async fn generate_content(&self, model: &str, parts: Vec<Part>) -> Result<Value, AppError> {
        let Some(api_key) = self.api_key() else {
            return Err(AppError::Misconfigured(
                "Server misconfiguration: GEMINI_API_KEY is missing".to_string(),
            ));
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        );

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": self.config.temperature },
        });

        info!("Using model: {}", model);

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                message: format!("Gemini request failed: {e}"),
                details: None,
                model: Some(model.to_string()),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let data: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            let message = data
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Gemini request failed")
                .to_string();

            return Err(AppError::Upstream {
                status,
                message,
                details: Some(data),
                model: Some(model.to_string()),
            });
        }

        Ok(data)
    }
}

/// First text part of the first candidate, or an empty string
pub fn extract_text(data: &Value) -> String {
    data.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.iter().find_map(|p| p.get("text").and_then(Value::as_str)))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: &str) -> GeminiConfig {
        GeminiConfig {
            api_base: api_base.to_string(),
            api_key: Some("g-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_model_name() {
        let conf = config("http://unused");
        let http = reqwest::Client::new();
        let client = GeminiClient::new(&http, &conf);

        assert_eq!(client.normalize_model_name(None), "gemini-1.5-flash");
        assert_eq!(client.normalize_model_name(Some("")), "gemini-1.5-flash");
        assert_eq!(
            client.normalize_model_name(Some("models/gemini-2.0-flash")),
            "gemini-2.0-flash"
        );
        assert_eq!(
            client.normalize_model_name(Some("gemini-1.5-pro")),
            "gemini-1.5-pro"
        );
    }

    #[test]
    fn test_extract_text_skips_non_text_parts() {
        let data = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"inline_data": {"mime_type": "image/png", "data": "AAAA"}},
                        {"text": "a sunny living room"}
                    ]
                }
            }]
        });
        assert_eq!(extract_text(&data), "a sunny living room");
        assert_eq!(extract_text(&json!({"candidates": []})), "");
    }

    #[test]
    fn test_parts_serialize_like_the_rest_api() {
        let parts = vec![
            Part::Text {
                text: "describe".to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
            },
        ];

        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!([
                {"text": "describe"},
                {"inline_data": {"mime_type": "image/png", "data": "AAAA"}}
            ])
        );
    }

    #[tokio::test]
    async fn test_generate_content_sends_key_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "g-test"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "generationConfig": {"temperature": 0.7}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let conf = config(&server.uri());
        let http = reqwest::Client::new();
        let data = GeminiClient::new(&http, &conf)
            .generate_content(
                "gemini-1.5-flash",
                vec![Part::Text {
                    text: "hi".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(extract_text(&data), "hello");
    }

    #[tokio::test]
    async fn test_upstream_error_carries_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "models/nope is not found"}
            })))
            .mount(&server)
            .await;

        let conf = config(&server.uri());
        let http = reqwest::Client::new();
        let err = GeminiClient::new(&http, &conf)
            .generate_content("nope", vec![])
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        match err {
            AppError::Upstream { message, model, .. } => {
                assert_eq!(message, "models/nope is not found");
                assert_eq!(model.as_deref(), Some("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
