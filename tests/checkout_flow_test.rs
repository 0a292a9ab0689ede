mod common;

use common::{seed_address, seed_pack_variant, seed_product, seed_zone, setup};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::atomic::Ordering;
use storefront_api::{
    entities::{order::OrderStatus, order_item, OrderItem},
    errors::ServiceError,
};
use uuid::Uuid;

#[tokio::test]
async fn happy_path_freezes_totals_and_decrements_stock() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let product = seed_product(&app.db, "Reserva 12yo", 289_000, 50).await;
    let pack = seed_pack_variant(&app.db, product.id, 3, 750_000).await;
    seed_zone(&app.db, "providencia", 3_500, 2).await;
    let address = seed_address(&app.db, user_id, "Providencia").await;

    app.services
        .cart
        .add_item(user_id, product.id, None, 1)
        .await
        .expect("add individual unit");
    app.services
        .cart
        .add_item(user_id, product.id, Some(pack.id), 1)
        .await
        .expect("add pack");

    let outcome = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect("checkout");

    assert_eq!(outcome.order.subtotal_minor, 1_039_000);
    assert_eq!(outcome.order.shipping_minor, 3_500);
    assert_eq!(outcome.order.total_minor, 1_042_500);
    assert_eq!(outcome.order.status, OrderStatus::Pending);
    assert!(outcome.redirect_url.is_some());
    assert!(outcome.order.external_reference.is_some());

    // 1 individual unit + 3 units in the pack.
    assert_eq!(common::product_stock(&app.db, product.id).await, 46);

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(outcome.order.id))
        .all(&*app.db)
        .await
        .expect("items");
    assert_eq!(items.len(), 2);
    let frozen_total: i64 = items.iter().map(|i| i.line_total_minor).sum();
    assert_eq!(frozen_total, 1_039_000);

    let cart = app.services.cart.snapshot(user_id).await.expect("cart");
    assert!(cart.lines.is_empty(), "cart must be cleared after checkout");
}

#[tokio::test]
async fn order_totals_survive_later_price_changes() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let product = seed_product(&app.db, "Gran Reserva", 120_000, 10).await;
    seed_zone(&app.db, "las condes", 4_000, 1).await;
    let address = seed_address(&app.db, user_id, "Las Condes").await;

    app.services
        .cart
        .add_item(user_id, product.id, None, 2)
        .await
        .expect("add");
    let outcome = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect("checkout");

    // Reprice the catalog after the fact.
    use sea_orm::sea_query::Expr;
    storefront_api::entities::Product::update_many()
        .col_expr(
            storefront_api::entities::product::Column::PriceMinor,
            Expr::value(999_999i64),
        )
        .exec(&*app.db)
        .await
        .expect("reprice");

    let order = app
        .services
        .lifecycle
        .get_order(outcome.order.id)
        .await
        .expect("order");
    assert_eq!(order.subtotal_minor, 240_000);
    assert_eq!(order.total_minor, 244_000);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_earlier_reservations() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let plenty = seed_product(&app.db, "Blend", 50_000, 100).await;
    let scarce = seed_product(&app.db, "Single Cask", 200_000, 2).await;
    seed_zone(&app.db, "nunoa", 3_000, 2).await;
    let address = seed_address(&app.db, user_id, "Nunoa").await;

    app.services
        .cart
        .add_item(user_id, plenty.id, None, 5)
        .await
        .expect("add plenty");
    app.services
        .cart
        .add_item(user_id, scarce.id, None, 2)
        .await
        .expect("add scarce");

    // Someone else takes the scarce units between cart and checkout.
    app.services
        .stock
        .reserve(scarce.id, 2)
        .await
        .expect("competing reservation");

    let err = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect_err("checkout must fail");
    assert!(matches!(err, ServiceError::InsufficientStock { .. }));

    // The plenty reservation was rolled back, not leaked.
    assert_eq!(common::product_stock(&app.db, plenty.id).await, 100);
    assert_eq!(common::product_stock(&app.db, scarce.id).await, 0);

    // Cart is untouched on failure.
    let cart = app.services.cart.snapshot(user_id).await.expect("cart");
    assert_eq!(cart.lines.len(), 2);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    seed_zone(&app.db, "santiago", 3_000, 2).await;
    let address = seed_address(&app.db, user_id, "Santiago").await;

    let err = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect_err("empty cart");
    assert!(matches!(err, ServiceError::EmptyCart));
}

#[tokio::test]
async fn unserved_commune_is_rejected_before_reserving() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let product = seed_product(&app.db, "Blend", 50_000, 10).await;
    let address = seed_address(&app.db, user_id, "Far Away").await;

    app.services
        .cart
        .add_item(user_id, product.id, None, 1)
        .await
        .expect("add");

    let err = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect_err("unknown commune");
    assert!(matches!(err, ServiceError::UnknownShippingZone(_)));
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);
}

#[tokio::test]
async fn gateway_failure_leaves_retryable_pending_order() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let product = seed_product(&app.db, "Blend", 50_000, 10).await;
    seed_zone(&app.db, "vitacura", 5_000, 1).await;
    let address = seed_address(&app.db, user_id, "Vitacura").await;

    app.services
        .cart
        .add_item(user_id, product.id, None, 2)
        .await
        .expect("add");

    app.gateway.set_fail(true);
    let outcome = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect("checkout succeeds despite gateway outage");
    assert!(outcome.redirect_url.is_none());
    assert_eq!(outcome.order.status, OrderStatus::Pending);
    // Stock stays reserved while the order is pending.
    assert_eq!(common::product_stock(&app.db, product.id).await, 8);

    app.gateway.set_fail(false);
    let retried = app
        .services
        .checkout
        .retry_payment_intent(outcome.order.id, user_id)
        .await
        .expect("retry");
    assert!(retried.redirect_url.is_some());
    assert_eq!(retried.order.status, OrderStatus::Pending);
    // Retry never re-reserves.
    assert_eq!(common::product_stock(&app.db, product.id).await, 8);
    assert_eq!(app.gateway.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_is_rejected_for_another_users_order() {
    let app = setup().await;
    let user_id = Uuid::new_v4();

    let product = seed_product(&app.db, "Blend", 50_000, 10).await;
    seed_zone(&app.db, "providencia", 3_500, 2).await;
    let address = seed_address(&app.db, user_id, "Providencia").await;

    app.services
        .cart
        .add_item(user_id, product.id, None, 1)
        .await
        .expect("add");
    let outcome = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect("checkout");

    let err = app
        .services
        .checkout
        .retry_payment_intent(outcome.order.id, Uuid::new_v4())
        .await
        .expect_err("foreign retry");
    assert!(matches!(err, ServiceError::Forbidden(_)));
}
