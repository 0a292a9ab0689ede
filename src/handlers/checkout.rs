//! Checkout and payment-retry endpoints.

use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(checkout))
}

pub fn payment_retry_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id/payment/retry", post(retry_payment))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Delivery address; must belong to the caller.
    pub address_id: Uuid,
}

/// Converts the caller's cart into a pending order and returns the gateway
/// redirect. A missing `redirect_url` means the gateway call failed and the
/// intent should be retried.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Pending order created"),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 422, description = "Empty cart or unserved commune", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .checkout(user.user_id, payload.address_id)
        .await?;
    Ok(created_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment/retry",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "New payment intent"),
        (status = 409, description = "Order no longer pending", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn retry_payment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .retry_payment_intent(order_id, user.user_id)
        .await?;
    Ok(success_response(outcome))
}
