pub mod health;
pub mod jobs;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::SchedulerError;
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" | "duplicate_job_key" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<SchedulerError> for ErrorResponse {
    fn from(err: SchedulerError) -> Self {
        if err.is_client_error() {
            tracing::debug!(error = %err, "Rejected job request");
        } else {
            tracing::error!(error = %err, "Scheduler failure");
        }

        match &err {
            SchedulerError::DuplicateJobKey { group, name } => {
                ErrorResponse::new("duplicate_job_key", err.to_string())
                    .with_details(serde_json::json!({ "group": group, "name": name }))
            }
            SchedulerError::Validation(_) | SchedulerError::Schedule(_) => {
                ErrorResponse::new("validation_error", err.to_string())
            }
            SchedulerError::Codec(_) | SchedulerError::Engine(_) => {
                ErrorResponse::new("internal_error", err.to_string())
            }
        }
    }
}
