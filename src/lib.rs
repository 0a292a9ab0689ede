//! Commerce transaction core for a membership-gated storefront: carts with
//! pack-variant pricing, atomic stock reservation at checkout, payment
//! intents against an external gateway, idempotent webhook ingestion and
//! the order fulfilment state machine.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod services;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        CartService, CheckoutService, OrderLifecycleService, PaymentGateway, ShippingRateTable,
        StockLedger, WebhookProcessor,
    },
};
use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Constructed service graph. Everything is `Clone` over shared handles so
/// handlers can grab what they need from state.
#[derive(Clone)]
pub struct Services {
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub lifecycle: OrderLifecycleService,
    pub shipping: ShippingRateTable,
    pub stock: StockLedger,
    pub webhooks: WebhookProcessor,
}

pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub services: Services,
}

/// Wires every service over one connection, one event channel and one
/// gateway client.
pub fn build_services(
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
) -> Services {
    let stock = StockLedger::new(db.clone(), event_sender.clone());
    let cart = CartService::new(db.clone(), stock.clone(), event_sender.clone());
    let shipping = ShippingRateTable::new(db.clone());
    let lifecycle = OrderLifecycleService::new(db.clone(), stock.clone(), event_sender.clone());
    let checkout = CheckoutService::new(
        db.clone(),
        cart.clone(),
        stock.clone(),
        shipping.clone(),
        lifecycle.clone(),
        gateway,
        event_sender.clone(),
    );
    let webhooks = WebhookProcessor::new(db, lifecycle.clone(), stock.clone(), event_sender);

    Services {
        cart,
        checkout,
        lifecycle,
        shipping,
        stock,
        webhooks,
    }
}

/// The full `/api/v1` surface plus health endpoints and swagger-ui.
pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/checkout", handlers::checkout::checkout_routes())
        .nest(
            "/orders",
            handlers::orders::orders_routes().merge(handlers::checkout::payment_retry_routes()),
        )
        .nest("/admin/orders", handlers::orders::admin_orders_routes())
        .nest("/shipping", handlers::shipping::shipping_routes())
        .nest("/payments", handlers::payment_webhooks::webhook_routes());

    Router::new()
        .nest("/api/v1", api)
        .merge(handlers::health::health_routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .with_state(state)
}
