//! Request-level errors and their HTTP mapping.

use std::fmt;

use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

use crate::protocol::ErrorOut;
use crate::runtime::ExecError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
  UnknownLevel(String),
  UnknownQuestion(String),
  Unauthenticated,
  Forbidden,
  RuntimeUnavailable(String),
  Store(StoreError),
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ApiError::UnknownLevel(l) => write!(f, "Unknown level: {l}"),
      ApiError::UnknownQuestion(id) => write!(f, "Unknown question: {id}"),
      ApiError::Unauthenticated => f.write_str("Sign in required"),
      ApiError::Forbidden => f.write_str("Admin access required"),
      ApiError::RuntimeUnavailable(msg) => write!(f, "Python runtime is not ready: {msg}"),
      ApiError::Store(e) => write!(f, "Storage error: {e}"),
    }
  }
}

impl std::error::Error for ApiError {}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::UnknownLevel(_) | ApiError::UnknownQuestion(_) => StatusCode::NOT_FOUND,
      ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden => StatusCode::FORBIDDEN,
      ApiError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self { ApiError::Store(e) }
}

impl From<ExecError> for ApiError {
  fn from(e: ExecError) -> Self {
    match e {
      ExecError::Unavailable(msg) => ApiError::RuntimeUnavailable(msg),
      other => ApiError::RuntimeUnavailable(other.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> axum::response::Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "quizify_backend", %status, error = %self, "Request failed");
    }
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}
