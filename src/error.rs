use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::store::StoreError;
use crate::domain::admission::{AdmissionError, Rejection};
use crate::domain::workflow::TransitionError;
use crate::utils::api_response::ApiResponse;

/// Field name to messages, rendered as the `errors` object of a 400 response.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Records `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

/// Error type returned by every handler.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    Rejected(Rejection),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Internal { message: String, detail: String },
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        AppError::Validation(errors)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        AppError::Internal { message: message.into(), detail: detail.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected(Rejection::NotApproved) => StatusCode::FORBIDDEN,
            AppError::Rejected(_) => StatusCode::BAD_REQUEST,
            AppError::Transition(TransitionError::NotPermitted(_)) => StatusCode::FORBIDDEN,
            AppError::Transition(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Duplicate(what) => AppError::Conflict(format!("{what} already exists")),
            StoreError::Stale(what) => AppError::Conflict(format!(
                "{what} was changed by another request, reload and try again"
            )),
            StoreError::Database(err) => AppError::internal("Database operation failed", err),
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Rejected(reason) => AppError::Rejected(reason),
            AdmissionError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errors = match &self {
            AppError::Validation(fields) => Some(json!(fields)),
            AppError::Rejected(reason) => Some(json!({ "reason": reason.code() })),
            AppError::Transition(err) => Some(json!({ "status": [err.to_string()] })),
            AppError::Internal { message, detail } => {
                error!(%detail, "{message}");
                Some(json!({ "error": detail }))
            }
            _ => None,
        };
        ApiResponse::<()>::error(status, self.to_string(), errors).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(AppError::Rejected(Rejection::AtCapacity).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Rejected(Rejection::NotApproved).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(StoreError::Stale("Post")).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(StoreError::NotFound("Lab")).status(), StatusCode::NOT_FOUND);
        let illegal = TransitionError::Illegal { from: "draft".into(), to: "published".into() };
        assert_eq!(AppError::from(illegal).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.check(false, "end_date", "must be after start_date");
        errors.check(true, "title", "is required");
        errors.add("end_date", "is too far away");
        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(value, json!({ "end_date": ["must be after start_date", "is too far away"] }));
        assert!(errors.into_result().is_err());
    }
}
