//! OpenAPI document served at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Commerce API",
        description = "Cart, checkout, payment and order lifecycle endpoints. \
                       Identity arrives via trusted upstream headers."
    ),
    paths(
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_item,
        crate::handlers::cart::set_quantity,
        crate::handlers::cart::remove_item,
        crate::handlers::cart::clear_cart,
        crate::handlers::checkout::checkout,
        crate::handlers::checkout::retry_payment,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,
        crate::handlers::orders::admin_list_orders,
        crate::handlers::orders::admin_advance_order,
        crate::handlers::orders::admin_cancel_order,
        crate::handlers::shipping::list_rates,
        crate::handlers::shipping::rate_for_commune,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::handlers::cart::AddItemRequest,
        crate::handlers::cart::SetQuantityRequest,
        crate::handlers::cart::RemoveItemRequest,
        crate::handlers::checkout::CheckoutRequest,
        crate::handlers::orders::AdvanceOrderRequest,
        crate::handlers::orders::CancelOrderRequest,
    )),
    tags(
        (name = "Cart", description = "Server-owned cart, keyed by the authenticated member"),
        (name = "Checkout", description = "Checkout and payment intent retry"),
        (name = "Orders", description = "Customer order views"),
        (name = "Admin", description = "Fulfilment state machine"),
        (name = "Shipping", description = "Commune rate table"),
        (name = "Payments", description = "Gateway webhook ingestion"),
        (name = "Health", description = "Liveness and readiness"),
    )
)]
pub struct ApiDoc;
