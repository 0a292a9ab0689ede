mod common;

use common::{seed_product, setup};
use storefront_api::errors::ServiceError;

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let app = setup().await;
    let product = seed_product(&app.db, "Limited Release", 150_000, 10).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let stock = app.services.stock.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(
            async move { stock.reserve(product_id, 1).await },
        ));
    }

    let mut successes = 0;
    let mut shortages = 0;
    for task in tasks {
        match task.await.expect("task") {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock { .. }) => shortages += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 10, "exactly the available units are reservable");
    assert_eq!(shortages, 10);
    assert_eq!(common::product_stock(&app.db, product.id).await, 0);
}

#[tokio::test]
async fn release_returns_units_exactly_once() {
    let app = setup().await;
    let product = seed_product(&app.db, "Blend", 50_000, 10).await;

    let token = app
        .services
        .stock
        .reserve(product.id, 3)
        .await
        .expect("reserve");
    assert_eq!(common::product_stock(&app.db, product.id).await, 7);

    app.services.stock.release(token).await.expect("release");
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);

    // Second release is a no-op, not a double credit.
    app.services.stock.release(token).await.expect("re-release");
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);
}

#[tokio::test]
async fn committed_reservations_cannot_be_released() {
    let app = setup().await;
    let product = seed_product(&app.db, "Blend", 50_000, 10).await;

    let token = app
        .services
        .stock
        .reserve(product.id, 4)
        .await
        .expect("reserve");
    app.services.stock.commit(token).await.expect("commit");

    app.services.stock.release(token).await.expect("release");
    // The sale consumed the units; release must not resurrect them.
    assert_eq!(common::product_stock(&app.db, product.id).await, 6);
}

#[tokio::test]
async fn order_release_reclaims_reserved_and_committed_units() {
    let app = setup().await;
    let product = seed_product(&app.db, "Blend", 50_000, 10).await;
    let order_id = common::seed_order(&app.db, uuid::Uuid::new_v4()).await.id;

    let reserved = app
        .services
        .stock
        .reserve(product.id, 2)
        .await
        .expect("reserve");
    let committed = app
        .services
        .stock
        .reserve(product.id, 3)
        .await
        .expect("reserve");
    app.services
        .stock
        .attach_to_order(&[reserved, committed], order_id)
        .await
        .expect("attach");
    app.services.stock.commit(committed).await.expect("commit");
    assert_eq!(common::product_stock(&app.db, product.id).await, 5);

    app.services
        .stock
        .release_for_order(order_id)
        .await
        .expect("release order");
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);

    // Releasing again finds nothing open and credits nothing.
    app.services
        .stock
        .release_for_order(order_id)
        .await
        .expect("release order again");
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);
}

#[tokio::test]
async fn zero_and_negative_reservations_are_rejected() {
    let app = setup().await;
    let product = seed_product(&app.db, "Blend", 50_000, 10).await;

    for units in [0, -3] {
        let err = app
            .services
            .stock
            .reserve(product.id, units)
            .await
            .expect_err("invalid units");
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
    assert_eq!(common::product_stock(&app.db, product.id).await, 10);
}
