use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// JSON body returned for every failed request
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// Gemini model the failing request was routed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{message}")]
    Unprocessable {
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    Misconfigured(String),
    /// Failure reported by (or while talking to) a third-party service
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<Value>,
        model: Option<String>,
    },
    #[error("{0}")]
    Timeout(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn upstream(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            details: None,
            model: None,
        }
    }

    /// Attach a `details` payload to the variants that carry one
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::BadRequest { details, .. }
            | Self::Unprocessable { details, .. }
            | Self::Upstream { details, .. } => *details = Some(value),
            _ => {}
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Misconfigured(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status, .. } => *status,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn into_body(self) -> ErrorBody {
        match self {
            Self::BadRequest { message, details } | Self::Unprocessable { message, details } => {
                ErrorBody {
                    error: message,
                    details,
                    model: None,
                }
            }
            Self::Upstream {
                message,
                details,
                model,
                ..
            } => ErrorBody {
                error: message,
                details,
                model,
            },
            Self::Internal(e) => ErrorBody {
                error: "Unexpected server error".to_string(),
                details: Some(Value::String(format!("{e:#}"))),
                model: None,
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
                model: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {self:#}");
        } else {
            tracing::warn!(status = status.as_u16(), "request rejected: {self}");
        }

        (status, Json(self.into_body())).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                Self::UnsupportedMediaType("Unsupported Media Type. Use application/json".into())
            }
            StatusCode::PAYLOAD_TOO_LARGE => {
                Self::PayloadTooLarge("Request body too large".into())
            }
            _ => Self::bad_request("Invalid JSON")
                .with_details(Value::String(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_status_and_model() {
        let err = AppError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "quota exhausted".into(),
            details: Some(serde_json::json!({"error": {"code": 429}})),
            model: Some("gemini-1.5-flash".into()),
        };

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body_json(response).await;
        assert_eq!(body["error"], "quota exhausted");
        assert_eq!(body["model"], "gemini-1.5-flash");
        assert_eq!(body["details"]["error"]["code"], 429);
    }

    #[tokio::test]
    async fn test_bad_request_omits_empty_fields() {
        let response = AppError::bad_request("imageBase64 is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"error": "imageBase64 is required"}));
    }

    #[test]
    fn test_with_details_ignored_for_plain_variants() {
        let err = AppError::Timeout("took too long".into()).with_details(Value::Null);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.to_string(), "took too long");
    }
}
