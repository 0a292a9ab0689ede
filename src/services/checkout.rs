//! Checkout orchestration: cart snapshot to pending order to payment intent.
//!
//! Stock is reserved and the order persisted before the outbound gateway
//! call, so a slow or failed gateway never holds a lock or blocks other
//! checkouts. A gateway failure leaves a retryable `pending` order.

use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, payment, CustomerAddress, Order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::{CartService, CartSnapshot},
        orders::{Actor, OrderLifecycleService},
        payment_gateway::{PaymentGateway, PaymentIntent},
        shipping::ShippingRateTable,
        stock::{ReservationToken, StockLedger},
    },
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Currency for the whole store; the core is single-currency.
pub const CURRENCY: &str = "CLP";

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    /// Where to send the customer to complete payment. Absent when the
    /// gateway call failed and a retry is required.
    pub redirect_url: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    cart: CartService,
    stock: StockLedger,
    shipping: ShippingRateTable,
    lifecycle: OrderLifecycleService,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        cart: CartService,
        stock: StockLedger,
        shipping: ShippingRateTable,
        lifecycle: OrderLifecycleService,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            cart,
            stock,
            shipping,
            lifecycle,
            gateway,
            event_sender,
        }
    }

    /// Converts the user's cart into a pending order and requests a payment
    /// intent from the gateway.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let snapshot = self.cart.snapshot(user_id).await?;
        if snapshot.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Shipping is resolved before touching stock so an unknown commune
        // fails without any rollback work.
        let address = CustomerAddress::find_by_id(address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;
        if address.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "address belongs to another user".to_string(),
            ));
        }
        let rate = self.shipping.rate_for_commune(&address.commune).await?;

        let tokens = self.reserve_snapshot(&snapshot).await?;

        let order = match self
            .persist_order(&snapshot, user_id, address_id, rate.cost_minor)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                // Order creation failed after reservations were taken; give
                // the units back before surfacing the error.
                self.release_all(&tokens).await;
                return Err(e);
            }
        };
        self.stock.attach_to_order(&tokens, order.id).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;

        // Stock is reserved and the order durable; from here a gateway
        // failure is recoverable via retry_payment_intent.
        let redirect_url = match self.request_intent(&order).await {
            Ok(intent) => Some(intent.redirect_url),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "payment intent failed; order left pending for retry");
                None
            }
        };

        self.cart.clear(user_id).await?;

        let order = self.lifecycle.get_order(order.id).await?;
        info!(order_id = %order.id, total_minor = order.total_minor, "checkout completed");
        Ok(CheckoutOutcome {
            order,
            redirect_url,
        })
    }

    /// Re-requests a payment intent for an existing pending order without
    /// re-reserving stock and without creating a second order.
    #[instrument(skip(self))]
    pub async fn retry_payment_intent(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let order = self.lifecycle.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "order belongs to another user".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::PaymentRetryNotAllowed(format!(
                "order is {}",
                order.status
            )));
        }

        let intent = self.request_intent(&order).await?;
        let order = self.lifecycle.get_order(order_id).await?;
        Ok(CheckoutOutcome {
            order,
            redirect_url: Some(intent.redirect_url),
        })
    }

    /// Reserves stock per product in ascending product-id order (stable
    /// ordering avoids lock-order inversions across overlapping checkouts).
    /// Any failure releases everything taken so far.
    async fn reserve_snapshot(
        &self,
        snapshot: &CartSnapshot,
    ) -> Result<Vec<ReservationToken>, ServiceError> {
        let mut demand: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &snapshot.lines {
            let entry = demand.entry(line.product_id).or_insert(0);
            *entry = entry.checked_add(line.base_units).ok_or_else(|| {
                ServiceError::ValidationError("base unit demand overflows".to_string())
            })?;
        }

        let mut tokens = Vec::with_capacity(demand.len());
        for (product_id, base_units) in demand {
            match self.stock.reserve(product_id, base_units).await {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    self.release_all(&tokens).await;
                    return Err(e);
                }
            }
        }
        Ok(tokens)
    }

    async fn release_all(&self, tokens: &[ReservationToken]) {
        for token in tokens {
            if let Err(e) = self.stock.release(*token).await {
                // Release is idempotent; a failure here is a genuine
                // storage problem worth surfacing loudly.
                error!(reservation_id = %token.0, error = %e, "rollback release failed");
            }
        }
    }

    /// Creates the order and its items with frozen prices in one
    /// transaction.
    async fn persist_order(
        &self,
        snapshot: &CartSnapshot,
        user_id: Uuid,
        address_id: Uuid,
        shipping_minor: i64,
    ) -> Result<order::Model, ServiceError> {
        let total_minor = snapshot
            .subtotal_minor
            .checked_add(shipping_minor)
            .ok_or_else(|| ServiceError::ValidationError("order total overflows".to_string()))?;

        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            address_id: Set(address_id),
            subtotal_minor: Set(snapshot.subtotal_minor),
            shipping_minor: Set(shipping_minor),
            total_minor: Set(total_minor),
            status: Set(OrderStatus::Pending),
            external_reference: Set(None),
            version: Set(1),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let order = order.insert(&txn).await?;

        for line in &snapshot.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                pack_variant_id: Set(line.pack_variant_id),
                quantity: Set(line.quantity),
                unit_price_minor: Set(line.unit_price_minor),
                line_total_minor: Set(line.line_total_minor),
                base_units: Set(line.base_units),
                created_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(order)
    }

    /// Outbound gateway call plus persistence of the returned reference and
    /// a pending payment row. No transaction is held across the call.
    async fn request_intent(&self, order: &order::Model) -> Result<PaymentIntent, ServiceError> {
        let intent = self
            .gateway
            .create_intent(order.id, order.total_minor, CURRENCY)
            .await?;

        Order::update_many()
            .col_expr(
                order::Column::ExternalReference,
                sea_orm::sea_query::Expr::value(intent.external_reference.clone()),
            )
            .col_expr(
                order::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(order.id))
            .exec(&*self.db)
            .await?;

        let record = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            transaction_id: Set(None),
            status: Set(payment::PaymentStatus::Pending),
            amount_minor: Set(order.total_minor),
            status_detail: Set(Some("intent created".to_string())),
            created_at: Set(Utc::now()),
            approved_at: Set(None),
        };
        record.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                order_id: order.id,
                external_reference: intent.external_reference.clone(),
            })
            .await;

        Ok(intent)
    }

    /// Cancels pending orders whose payment never arrived within the TTL.
    /// Runs through the lifecycle manager so stock release and audit events
    /// follow the same path as any other cancellation.
    #[instrument(skip(self))]
    pub async fn sweep_stale_pending_orders(&self, ttl_hours: i64) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - ChronoDuration::hours(ttl_hours);
        let stale = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0u64;
        for order in stale {
            match self
                .lifecycle
                .transition(
                    order.id,
                    OrderStatus::Cancelled,
                    Actor::Gateway,
                    Some("payment window expired"),
                )
                .await
            {
                Ok(_) => cancelled += 1,
                // A webhook may approve the order between the query and the
                // transition; losing that race is fine.
                Err(ServiceError::InvalidTransition { .. })
                | Err(ServiceError::ConcurrentModification(_)) => {
                    warn!(order_id = %order.id, "sweep lost race; order no longer pending");
                }
                Err(e) => return Err(e),
            }
        }

        if cancelled > 0 {
            info!(cancelled, "stale pending orders cancelled");
        }
        Ok(cancelled)
    }
}

/// Background loop driving the expiry sweep.
pub async fn run_pending_order_sweep(
    checkout: CheckoutService,
    ttl_hours: i64,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = checkout.sweep_stale_pending_orders(ttl_hours).await {
            error!(error = %e, "pending order sweep failed");
        }
    }
}
