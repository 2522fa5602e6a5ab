use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::ingest::PublishError;
use crate::locator::QueryError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  DatabaseError(tracker_db::DbError),
  ValidationError(String),
  PublishError(PublishError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::DatabaseError(db_err) => {
        let (status, message) = if matches!(db_err, tracker_db::DbError::PlayerNotFound) {
          (StatusCode::NOT_FOUND, "Player not found")
        } else if db_err.is_transient() {
          tracing::warn!(?db_err, "Location store unavailable");
          (
            StatusCode::SERVICE_UNAVAILABLE,
            "The location store is temporarily unavailable. Please retry.",
          )
        } else {
          // Don't expose internal database errors
          tracing::error!("Internal database error: {:?}", db_err);
          (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred. Please try again later.",
          )
        };

        let error_response = ErrorResponse::new(message);
        (status, Json(error_response)).into_response()
      }
      AppError::ValidationError(msg) => {
        tracing::warn!(validation_error = %msg, "Validation failed");
        let error_response = ErrorResponse::new(msg);
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
      AppError::PublishError(err) => {
        tracing::warn!(error = %err, "Event not accepted");
        let error_response = ErrorResponse::with_details("Event queue unavailable", err.to_string());
        (StatusCode::SERVICE_UNAVAILABLE, Json(error_response)).into_response()
      }
    }
  }
}

impl From<tracker_db::DbError> for AppError {
  fn from(err: tracker_db::DbError) -> Self {
    AppError::DatabaseError(err)
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::ValidationError(err.to_string())
  }
}

impl From<QueryError> for AppError {
  fn from(err: QueryError) -> Self {
    match err {
      QueryError::UnmappedServerType(_) => AppError::ValidationError(err.to_string()),
      QueryError::Store(db_err) => AppError::DatabaseError(db_err),
    }
  }
}

impl From<PublishError> for AppError {
  fn from(err: PublishError) -> Self {
    AppError::PublishError(err)
  }
}
