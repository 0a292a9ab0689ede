//! Shipping rate lookup for the storefront address forms.

use crate::{
    errors::ServiceError, handlers::common::success_response, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;

pub fn shipping_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rates", get(list_rates))
        .route("/rates/:commune", get(rate_for_commune))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipping/rates",
    responses((status = 200, description = "All served communes with rates")),
    tag = "Shipping"
)]
pub async fn list_rates(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let rates = state.services.shipping.list_rates().await?;
    Ok(success_response(rates))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipping/rates/{commune}",
    params(("commune" = String, Path, description = "Commune name, case-insensitive")),
    responses(
        (status = 200, description = "Rate for the commune"),
        (status = 422, description = "Commune not served", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipping"
)]
pub async fn rate_for_commune(
    State(state): State<Arc<AppState>>,
    Path(commune): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let rate = state.services.shipping.rate_for_commune(&commune).await?;
    Ok(success_response(rate))
}
