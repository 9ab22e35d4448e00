//! HTTP API of the remote authority
//!
//! - `GET /health`
//! - `GET /api/events` - the whole log, in arrival order
//! - `GET /api/events?since=<seq>` - events that arrived after `seq`
//! - `POST /api/events` - append a JSON array, skipping known client ids

pub mod http;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}
