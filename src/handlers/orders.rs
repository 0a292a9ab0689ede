//! Order endpoints: customer views plus the admin fulfilment surface.

use crate::{
    auth::{AdminUser, AuthenticatedUser},
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/:id", get(get_my_order))
}

pub fn admin_orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin_list_orders))
        .route("/:id/advance", post(admin_advance_order))
        .route("/:id/cancel", post(admin_cancel_order))
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<crate::entities::order_item::Model>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<OrderStatus>,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct PaginatedOrders {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceOrderRequest {
    /// One fulfilment step forward: preparing, shipped or delivered.
    pub target: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Caller's orders, newest first")),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .lifecycle
        .list_orders_for_user(user.user_id)
        .await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_my_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.lifecycle.get_order(order_id).await?;
    // Customers only see their own orders; answer 404 rather than leaking
    // existence.
    if order.user_id != user.user_id {
        return Err(ServiceError::NotFound(format!(
            "Order {} not found",
            order_id
        )));
    }
    let items = state.services.lifecycle.get_order_items(order_id).await?;
    Ok(success_response(OrderWithItems { order, items }))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page, 1-based"),
        ("limit" = Option<u64>, Query, description = "Page size"),
        ("status" = Option<String>, Query, description = "Filter by status")
    ),
    responses((status = 200, description = "Paginated orders")),
    tag = "Admin"
)]
pub async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .lifecycle
        .list_orders(query.page, query.limit, query.status)
        .await?;
    Ok(success_response(PaginatedOrders {
        orders,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/advance",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = AdvanceOrderRequest,
    responses(
        (status = 200, description = "Order advanced"),
        (status = 409, description = "Illegal transition or concurrent update", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn admin_advance_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AdvanceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .lifecycle
        .advance(order_id, payload.target)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled, stock released"),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn admin_cancel_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .lifecycle
        .cancel(order_id, &payload.reason)
        .await?;
    Ok(success_response(order))
}
