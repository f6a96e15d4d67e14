use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::errors::BugsightError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Navigation(String),
    #[error("{0}")]
    WebDriver(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Navigation(_) | ApiError::WebDriver(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Navigation(_) => "navigation_failed",
            ApiError::WebDriver(_) => "webdriver_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// `{error, message}` body shared by JSON responses and stream events
    pub fn body(&self) -> serde_json::Value {
        json!({ "error": self.code(), "message": self.to_string() })
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match BugsightError::from(err) {
            BugsightError::Navigation(msg) | BugsightError::Timeout(msg) => {
                ApiError::Navigation(msg)
            }
            BugsightError::WebDriverFailed(msg) => ApiError::WebDriver(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
