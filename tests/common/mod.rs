//! Shared harness: in-memory SQLite with the schema created from the
//! entities, a stub payment gateway, and seed helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Schema, Set,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use storefront_api::{
    build_services,
    entities::{customer_address, order, pack_variant, product, shipping_zone_rate},
    errors::ServiceError,
    events::{process_events, EventSender},
    services::payment_gateway::{PaymentGateway, PaymentIntent},
    Services,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway stub. `fail` makes `create_intent` error so the pending-order
/// retry path can be exercised.
pub struct StubGateway {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(
        &self,
        order_id: Uuid,
        _amount_minor: i64,
        _currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "stub gateway unavailable".to_string(),
            ));
        }
        Ok(PaymentIntent {
            external_reference: format!("pref-{}", order_id),
            redirect_url: format!("https://gateway.test/pay/{}", order_id),
        })
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: Services,
    pub gateway: Arc<StubGateway>,
}

/// One shared in-memory connection so every query sees the same database.
pub async fn setup() -> TestApp {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("sqlite connect");

    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();
    let statements = [
        schema.create_table_from_entity(storefront_api::entities::Product),
        schema.create_table_from_entity(storefront_api::entities::PackVariant),
        schema.create_table_from_entity(storefront_api::entities::CartItem),
        schema.create_table_from_entity(storefront_api::entities::Order),
        schema.create_table_from_entity(storefront_api::entities::OrderItem),
        schema.create_table_from_entity(storefront_api::entities::Payment),
        schema.create_table_from_entity(storefront_api::entities::StockReservation),
        schema.create_table_from_entity(storefront_api::entities::ShippingZoneRate),
        schema.create_table_from_entity(storefront_api::entities::CustomerAddress),
    ];
    for stmt in statements {
        db.execute(backend.build(&stmt)).await.expect("create table");
    }

    let db = Arc::new(db);
    let (tx, rx) = mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(tx));
    tokio::spawn(process_events(rx));

    let gateway = StubGateway::new();
    let services = build_services(db.clone(), event_sender, gateway.clone());

    TestApp {
        db,
        services,
        gateway,
    }
}

pub async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    price_minor: i64,
    stock: i32,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        sku: Set(format!("SKU-{}", Uuid::new_v4())),
        price_minor: Set(price_minor),
        stock: Set(stock),
        allow_individual_sale: Set(true),
        active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed product")
}

pub async fn seed_pack_variant(
    db: &DatabaseConnection,
    product_id: Uuid,
    units_per_pack: i32,
    price_minor: i64,
) -> pack_variant::Model {
    pack_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        name: Set(format!("pack of {}", units_per_pack)),
        units_per_pack: Set(units_per_pack),
        price_minor: Set(price_minor),
        active: Set(true),
        is_default: Set(false),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed pack variant")
}

pub async fn seed_zone(
    db: &DatabaseConnection,
    commune: &str,
    cost_minor: i64,
    lead_time_days: i32,
) -> shipping_zone_rate::Model {
    shipping_zone_rate::ActiveModel {
        id: Set(Uuid::new_v4()),
        commune: Set(commune.to_lowercase()),
        cost_minor: Set(cost_minor),
        lead_time_days: Set(lead_time_days),
    }
    .insert(db)
    .await
    .expect("seed shipping zone")
}

pub async fn seed_address(
    db: &DatabaseConnection,
    user_id: Uuid,
    commune: &str,
) -> customer_address::Model {
    customer_address::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        street: Set("Av. Siempre Viva 742".to_string()),
        city: Set("Santiago".to_string()),
        commune: Set(commune.to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed address")
}

/// Minimal pending order row, for tests that only need a real `orders.id`
/// to satisfy the `stock_reservations.order_id` foreign key.
pub async fn seed_order(db: &DatabaseConnection, user_id: Uuid) -> order::Model {
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        address_id: Set(Uuid::new_v4()),
        subtotal_minor: Set(0),
        shipping_minor: Set(0),
        total_minor: Set(0),
        status: Set(order::OrderStatus::Pending),
        external_reference: Set(None),
        version: Set(0),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed order")
}

/// Full cart-to-pending-order flow for one product, used by lifecycle and
/// webhook tests that need an order to act on.
pub async fn place_pending_order(
    app: &TestApp,
    user_id: Uuid,
    quantity: i32,
    stock: i32,
) -> (storefront_api::entities::order::Model, Uuid) {
    let product = seed_product(&app.db, "Blend", 50_000, stock).await;
    // One zone per call keeps communes unique across orders in a test.
    let zone = seed_zone(&app.db, &format!("zone-{}", Uuid::new_v4()), 3_000, 2).await;
    let address = seed_address(&app.db, user_id, &zone.commune).await;

    app.services
        .cart
        .add_item(user_id, product.id, None, quantity)
        .await
        .expect("add to cart");
    let outcome = app
        .services
        .checkout
        .checkout(user_id, address.id)
        .await
        .expect("checkout");
    (outcome.order, product.id)
}

pub async fn product_stock(db: &DatabaseConnection, product_id: Uuid) -> i32 {
    use sea_orm::EntityTrait;
    storefront_api::entities::Product::find_by_id(product_id)
        .one(db)
        .await
        .expect("query product")
        .expect("product exists")
        .stock
}
