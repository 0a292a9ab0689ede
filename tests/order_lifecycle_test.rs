mod common;

use common::{place_pending_order, setup};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::{
    entities::{
        order::{self, OrderStatus},
        payment::{self, PaymentStatus},
        stock_reservation::{self, ReservationStatus},
        Payment, StockReservation,
    },
    errors::ServiceError,
    services::{
        payment_webhook::{Ack, GatewayOutcome, WebhookNotification},
        Actor,
    },
};
use uuid::Uuid;

/// Drives a real gateway approval through the webhook processor so the
/// payment row is claimed and the reservations are committed.
async fn approve_via_gateway(app: &common::TestApp, order: &order::Model, txn: &str) {
    let ack = app
        .services
        .webhooks
        .process(WebhookNotification {
            transaction_id: txn.to_string(),
            external_reference: order.external_reference.clone().expect("reference"),
            outcome: GatewayOutcome::Approved,
            status_detail: None,
        })
        .await
        .expect("approve");
    assert_eq!(ack, Ack::Processed);
}

#[tokio::test]
async fn fulfilment_path_advances_and_bumps_version() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, _) = place_pending_order(&app, user_id, 1, 10).await;
    assert_eq!(order.version, 1);

    let paid = app
        .services
        .lifecycle
        .transition(order.id, OrderStatus::Paid, Actor::Gateway, None)
        .await
        .expect("pending -> paid");
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.version, 2);

    for target in [
        OrderStatus::Preparing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let advanced = app
            .services
            .lifecycle
            .advance(order.id, target)
            .await
            .expect("advance");
        assert_eq!(advanced.status, target);
    }

    let delivered = app.services.lifecycle.get_order(order.id).await.expect("order");
    assert_eq!(delivered.version, 5);
}

#[tokio::test]
async fn illegal_transitions_leave_the_order_untouched() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, _) = place_pending_order(&app, user_id, 1, 10).await;

    // Admins may not mark orders paid, and nothing skips ahead.
    for (to, actor) in [
        (OrderStatus::Paid, Actor::Admin),
        (OrderStatus::Shipped, Actor::Admin),
        (OrderStatus::Delivered, Actor::Gateway),
    ] {
        let err = app
            .services
            .lifecycle
            .transition(order.id, to, actor, None)
            .await
            .expect_err("illegal");
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    }

    let unchanged = app.services.lifecycle.get_order(order.id).await.expect("order");
    assert_eq!(unchanged.status, OrderStatus::Pending);
    assert_eq!(unchanged.version, 1);
}

#[tokio::test]
async fn cancelling_pending_order_releases_stock() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, product_id) = place_pending_order(&app, user_id, 3, 10).await;
    assert_eq!(common::product_stock(&app.db, product_id).await, 7);

    let cancelled = app
        .services
        .lifecycle
        .cancel(order.id, "customer changed their mind")
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(common::product_stock(&app.db, product_id).await, 10);

    // Cancelling twice is illegal, and stock is not credited again.
    let err = app
        .services
        .lifecycle
        .cancel(order.id, "again")
        .await
        .expect_err("double cancel");
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    assert_eq!(common::product_stock(&app.db, product_id).await, 10);
}

#[tokio::test]
async fn cancelling_paid_order_flags_refund_due() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, product_id) = place_pending_order(&app, user_id, 2, 10).await;

    approve_via_gateway(&app, &order, "txn-refund-test").await;

    let cancelled = app
        .services
        .lifecycle
        .cancel(order.id, "out of stock at warehouse")
        .await
        .expect("cancel paid");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(common::product_stock(&app.db, product_id).await, 10);

    let payment_row = Payment::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .one(&*app.db)
        .await
        .expect("query")
        .expect("payment row");
    assert_eq!(payment_row.status, PaymentStatus::RefundDue);
}

#[tokio::test]
async fn cancelling_paid_order_returns_committed_units() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, product_id) = place_pending_order(&app, user_id, 4, 50).await;
    assert_eq!(common::product_stock(&app.db, product_id).await, 46);

    // Gateway approval commits the reservations; the units stay consumed.
    approve_via_gateway(&app, &order, "txn-committed-cancel").await;
    assert_eq!(common::product_stock(&app.db, product_id).await, 46);

    let cancelled = app
        .services
        .lifecycle
        .cancel(order.id, "warehouse damage")
        .await
        .expect("cancel paid");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Committed units come back to sellable stock on cancellation.
    assert_eq!(common::product_stock(&app.db, product_id).await, 50);
    let open = StockReservation::find()
        .filter(stock_reservation::Column::OrderId.eq(order.id))
        .all(&*app.db)
        .await
        .expect("reservations");
    assert!(!open.is_empty());
    assert!(open
        .iter()
        .all(|r| r.status == ReservationStatus::Released));
}

#[tokio::test]
async fn stale_pending_orders_are_swept() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let (order, product_id) = place_pending_order(&app, user_id, 2, 10).await;

    // Age the order past the TTL.
    use sea_orm::sea_query::Expr;
    use storefront_api::entities::{order as order_entity, Order};
    Order::update_many()
        .col_expr(
            order_entity::Column::CreatedAt,
            Expr::value(chrono::Utc::now() - chrono::Duration::hours(72)),
        )
        .filter(order_entity::Column::Id.eq(order.id))
        .exec(&*app.db)
        .await
        .expect("age order");

    let swept = app
        .services
        .checkout
        .sweep_stale_pending_orders(48)
        .await
        .expect("sweep");
    assert_eq!(swept, 1);

    let cancelled = app.services.lifecycle.get_order(order.id).await.expect("order");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(common::product_stock(&app.db, product_id).await, 10);

    // A second sweep finds nothing.
    let swept = app
        .services
        .checkout
        .sweep_stale_pending_orders(48)
        .await
        .expect("sweep again");
    assert_eq!(swept, 0);
}
