use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

/// Per-field validation messages, serialised as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Record "field is required" when `value` is absent or blank; returns the trimmed value.
    pub fn required(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                self.add(field, format!("The {} field is required.", field.replace('_', " ")));
                None
            }
        }
    }

    /// Like `required`, but an absent value is fine; only a blank one is rejected.
    pub fn optional(&mut self, field: &str, value: Option<String>) -> Option<String> {
        value.and_then(|v| self.required(field, Some(v)))
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() { Ok(()) } else { Err(ApiError::Validation(self)) }
    }

    /// Hands back the validated value(s) only when no field failed.
    pub fn check<T>(self, value: Option<T>) -> Result<T, ApiError> {
        match value {
            Some(v) if self.is_empty() => Ok(v),
            _ => Err(ApiError::Validation(self)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("The given data was invalid.")] Validation(FieldErrors),
    #[error("Unauthenticated.")] Unauthorized,
    #[error("This action is unauthorized.")] Forbidden,
    #[error("You are blocked")] Blocked,
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("Too Many Attempts.")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::default();
        errors.add(field, message);
        ApiError::Validation(errors)
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Integrity(detail) => ApiError::invalid("reference", detail),
            RepoError::Internal(detail) => {
                tracing::error!(%detail, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::Blocked => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let errors = match self {
            ApiError::Validation(fields) => Some(fields.clone()),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { message: self.to_string(), errors })
    }
}
