use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lookout_core::LookoutError;
use serde_json::json;

/// A failed request, rendered as a JSON body naming the stage that failed.
#[derive(Debug)]
pub struct ApiError(pub LookoutError);

impl From<LookoutError> for ApiError {
    fn from(err: LookoutError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LookoutError::Auth(_) => StatusCode::UNAUTHORIZED,
            LookoutError::NotFound(_) | LookoutError::FileNotFound(_) => StatusCode::NOT_FOUND,
            LookoutError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            LookoutError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LookoutError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            LookoutError::Generation(_) | LookoutError::GitHub(_) => StatusCode::BAD_GATEWAY,
            LookoutError::Config(_) | LookoutError::Parse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), stage = %self.0.stage(), error = %self.0, "request failed");
        let body = Json(json!({
            "error": {
                "stage": self.0.stage(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
