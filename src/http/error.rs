//! HTTP mapping for `CommerceError`.
//!
//! Body: `{"error": "<code>", "message": "...", "fields"?: {...}}`.
//! Storage failures are logged and answered with a generic message.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use tracing::error;
use crate::CommerceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

impl CommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            CommerceError::Validation(_) | CommerceError::Fields(_) | CommerceError::ProductInactive(_)
            | CommerceError::InvalidTransition { .. } | CommerceError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            CommerceError::OutOfStock { .. } | CommerceError::ProductInUse(_) => StatusCode::CONFLICT,
            CommerceError::NotFound(_) => StatusCode::NOT_FOUND,
            CommerceError::Forbidden(_) => StatusCode::FORBIDDEN,
            CommerceError::Unauthorized => StatusCode::UNAUTHORIZED,
            CommerceError::DuplicateOrderNumber(_) | CommerceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommerceError::Validation(_) | CommerceError::Fields(_) => "validation_error",
            CommerceError::OutOfStock { .. } => "out_of_stock",
            CommerceError::ProductInactive(_) => "product_inactive",
            CommerceError::InvalidTransition { .. } => "invalid_transition",
            CommerceError::InsufficientBalance { .. } => "insufficient_balance",
            CommerceError::NotFound(_) => "not_found",
            CommerceError::Forbidden(_) => "forbidden",
            CommerceError::Unauthorized => "unauthorized",
            CommerceError::ProductInUse(_) => "product_in_use",
            CommerceError::DuplicateOrderNumber(_) | CommerceError::Storage(_) => "internal_error",
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, fields) = match &self {
            CommerceError::Storage(_) | CommerceError::DuplicateOrderNumber(_) => {
                error!(error = %self, "request failed");
                ("Internal server error".to_string(), None)
            }
            CommerceError::Fields(errors) => (self.to_string(), serde_json::to_value(errors).ok()),
            _ => (self.to_string(), None),
        };
        (status, Json(ErrorBody { error: self.code(), message, fields })).into_response()
    }
}
