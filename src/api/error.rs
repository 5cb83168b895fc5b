use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::score::{ServiceError, ValidationError, ValidationErrors};

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<ValidationError>),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ValidationBody {
    error: &'static str,
    details: Vec<ValidationError>,
}

#[derive(Serialize)]
struct FailureBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(ValidationBody {
                    error: "Validation failed",
                    details,
                }),
            )
                .into_response(),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(FailureBody {
                    success: false,
                    message,
                }),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FailureBody {
                    success: false,
                    message,
                }),
            )
                .into_response(),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::Validation(err.errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ValidationErrors::single(rejection.body_text()).errors)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            // Only the generic message leaves the process; details were logged.
            ServiceError::Repository { message, .. } => ApiError::Internal(message.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
