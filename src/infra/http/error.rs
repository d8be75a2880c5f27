use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::RenderFailure;

/// Diagnostic detail attached to failure responses for the logging middleware.
///
/// The public body stays terse; the report carries what operators need.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Wire shape of every failure response.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: String,
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    error: String,
    source: &'static str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error: detail.into(),
            source: "infra::http::bad_request",
        }
    }
}

impl From<RenderFailure> for ApiError {
    fn from(failure: RenderFailure) -> Self {
        // All pipeline failures share one status; the stable kind travels in
        // the `error` field.
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: failure.to_string(),
            error: failure.kind().as_str().to_string(),
            source: "infra::http::render_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = FailureBody {
            success: false,
            message: self.message.clone(),
            error: self.error.clone(),
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            self.source,
            self.status,
            format!("{}: {}", self.error, self.message),
        )
        .attach(&mut response);
        response
    }
}
