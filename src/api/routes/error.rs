use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde::Serialize;

use crate::error::DomainWatchError;

/// JSON body extractor that reports malformed bodies as a 400 with the
/// regular error body instead of axum's plain-text rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient: Option<bool>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                kind: "invalid_request",
                error: message.into(),
                transient: None,
            },
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DomainWatchError> for ApiError {
    fn from(e: DomainWatchError) -> Self {
        let (status, kind, transient) = match &e {
            DomainWatchError::InvalidDomain(_) => (StatusCode::BAD_REQUEST, "invalid_domain", None),
            DomainWatchError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request", None),
            DomainWatchError::DuplicateDomain(_) => (StatusCode::CONFLICT, "duplicate_domain", None),
            DomainWatchError::DomainNotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            DomainWatchError::CheckFailed(check) => (
                StatusCode::BAD_GATEWAY,
                "check_failed",
                Some(check.is_transient()),
            ),
            _ => {
                error!("Internal error while handling request: {}", e);
                return ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: ErrorResponse {
                        kind: "internal",
                        error: "Internal server error".to_string(),
                        transient: None,
                    },
                };
            }
        };

        ApiError {
            status,
            body: ErrorResponse {
                kind,
                error: e.to_string(),
                transient,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
