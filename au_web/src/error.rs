//! ABOUTME: RFC 7807 problem responses for the Aura API and domain error mapping
//! ABOUTME: Converts validation errors and core errors to standardized format

use crate::models::{FieldError, ProblemDetails};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;
use tracing::error;
use validator::ValidationErrors;

/// API error wrapper for RFC 7807 Problem Details
#[derive(Debug)]
pub struct ApiError {
    pub problem: ProblemDetails,
    pub status_code: u16,
}

impl ApiError {
    pub fn new(problem: ProblemDetails) -> Self {
        let status_code = problem.status.unwrap_or(500);
        Self {
            problem,
            status_code,
        }
    }

    /// Create a validation error from validator::ValidationErrors
    pub fn validation(errors: ValidationErrors) -> Self {
        let field_errors: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| FieldError {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for field '{}'", field)),
                    value: error.params.get("value").cloned(),
                })
            })
            .collect();

        let problem = ProblemDetails::validation_error("Request validation failed").with_extension(
            "errors",
            serde_json::to_value(field_errors).unwrap_or_default(),
        );

        Self::new(problem)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ProblemDetails::validation_error(detail.into()))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7235.html#section-3.1",
                "Unauthorized",
            )
            .with_status(401)
            .with_detail(detail.into()),
        )
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.3",
                "Forbidden",
            )
            .with_status(403)
            .with_detail(detail.into()),
        )
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.4",
                "Not Found",
            )
            .with_status(404)
            .with_detail(detail.into()),
        )
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.8",
                "Conflict",
            )
            .with_status(409)
            .with_detail(detail.into()),
        )
    }

    pub fn internal_server_error(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.6.1",
                "Internal Server Error",
            )
            .with_status(500)
            .with_detail(detail.into()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.problem.title,
            self.problem.detail.as_deref().unwrap_or("No details available")
        )
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/problem+json")
            .json(&self.problem)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

/// Third-party failures surface as 400; internal faults stay 500 and are logged
impl From<au_core::Error> for ApiError {
    fn from(err: au_core::Error) -> Self {
        match err {
            au_core::Error::Validation(msg) => Self::bad_request(msg),
            au_core::Error::External(msg) => Self::bad_request(msg),
            au_core::Error::Storage(msg) => Self::bad_request(msg),
            au_core::Error::Unauthorized(msg) => Self::unauthorized(msg),
            au_core::Error::Forbidden(msg) => Self::forbidden(msg),
            au_core::Error::NotFound(msg) => Self::not_found(msg),
            au_core::Error::Conflict(msg) => Self::conflict(msg),
            au_core::Error::Database(msg) => {
                error!("Database error: {}", msg);
                Self::internal_server_error("Database error")
            }
            au_core::Error::Config(msg) => {
                error!("Configuration error: {}", msg);
                Self::internal_server_error("Configuration error")
            }
            au_core::Error::Io(e) => {
                error!("IO error: {}", e);
                Self::internal_server_error("IO error")
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
