//! Mapping from core errors to HTTP responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::FetchError;

/// A [`FetchError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub FetchError);

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FetchError::UpstreamUnavailable { .. } | FetchError::PoolExhausted(_) | FetchError::Shutdown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FetchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            FetchError::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self.0, "Request failed");
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        let mut response = (status, body).into_response();

        if let Some(retry_after) = self.0.retry_after() {
            // Whole seconds, rounded up, at least 1.
            let secs = retry_after.as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_open_circuit_is_503_with_retry_after() {
        let response = ApiError(FetchError::UpstreamUnavailable {
            target: "api.example".into(),
            retry_after: Duration::from_millis(1500),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_status_mapping() {
        let exhausted = FetchError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(FetchError::Network("reset".into())),
        };
        assert_eq!(ApiError(exhausted).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError(FetchError::InvalidRequest("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(FetchError::PoolExhausted(Duration::from_secs(1))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
