use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Conflict", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail (e.g. the offending product id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product is not sold individually")]
    InvalidSelection,

    #[error("Variant {variant_id} not available for product {product_id}")]
    VariantNotFound { product_id: Uuid, variant_id: Uuid },

    #[error("Cart is empty")]
    EmptyCart,

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("No shipping rate for commune '{0}'")]
    UnknownShippingZone(String),

    #[error("Invalid order transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown order reference: {0}")]
    UnknownOrder(String),

    #[error("Payment intent retry not allowed: {0}")]
    PaymentRetryNotAllowed(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment gateway error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidSelection | ServiceError::VariantNotFound { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::EmptyCart => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::UnknownShippingZone(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InsufficientStock { .. } => StatusCode::CONFLICT,
            ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::ConcurrentModification(_) => StatusCode::CONFLICT,
            ServiceError::PaymentRetryNotAllowed(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) | ServiceError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidSignature | ServiceError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            // A failed database call during webhook ingestion must read as
            // retryable to the gateway, not as a permanent rejection.
            ServiceError::DatabaseError(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ServiceError::InsufficientStock { product_id, .. } => {
                Some(format!("product_id={}", product_id))
            }
            ServiceError::VariantNotFound { variant_id, .. } => {
                Some(format!("variant_id={}", variant_id))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message: self.to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
