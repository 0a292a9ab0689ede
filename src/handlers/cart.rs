//! Cart endpoints. The cart is keyed by the authenticated user; there is no
//! cart id in the URL.

use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    handlers::common::{no_content_response, success_response, validate_input},
    AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items", put(set_quantity))
        .route("/items", delete(remove_item))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    /// Pack variant; omit to buy individual units.
    pub pack_variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetQuantityRequest {
    pub product_id: Uuid,
    pub pack_variant_id: Option<Uuid>,
    /// 0 removes the line.
    #[validate(range(min = 0))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemoveItemRequest {
    pub product_id: Uuid,
    pub pack_variant_id: Option<Uuid>,
}

/// The caller's cart with resolved pricing.
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart snapshot"),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state.services.cart.snapshot(user.user_id).await?;
    Ok(success_response(snapshot))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart snapshot"),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invalid selection", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let snapshot = state
        .services
        .cart
        .add_item(
            user.user_id,
            payload.product_id,
            payload.pack_variant_id,
            payload.quantity,
        )
        .await?;
    Ok(success_response(snapshot))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items",
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "Updated cart snapshot"),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn set_quantity(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let snapshot = state
        .services
        .cart
        .set_quantity(
            user.user_id,
            payload.product_id,
            payload.pack_variant_id,
            payload.quantity,
        )
        .await?;
    Ok(success_response(snapshot))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items",
    request_body = RemoveItemRequest,
    responses((status = 200, description = "Updated cart snapshot")),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<RemoveItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state
        .services
        .cart
        .remove_item(user.user_id, payload.product_id, payload.pack_variant_id)
        .await?;
    Ok(success_response(snapshot))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses((status = 204, description = "Cart emptied")),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.cart.clear(user.user_id).await?;
    Ok(no_content_response())
}
