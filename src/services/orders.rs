//! Order lifecycle state machine.
//!
//! All transitions — gateway-driven and admin-driven — funnel through
//! `transition`, which enforces the closed table below and bumps the order's
//! optimistic version so a single order is never transitioned concurrently
//! by two callers.

use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, payment, Order, OrderItem, Payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::StockLedger,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Who is asking for a transition. The table is stricter for admins on the
/// payment edges and stricter for the gateway on fulfillment edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Payment webhook processor (or the expiry sweep acting on its behalf).
    Gateway,
    Admin,
}

/// Legal transitions. Everything not listed is rejected.
fn transition_allowed(actor: Actor, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    if from.is_terminal() {
        return false;
    }
    match (actor, from, to) {
        // Payment outcome edges belong to the gateway.
        (Actor::Gateway, Pending, Paid) => true,
        (Actor::Gateway, Pending, Cancelled) => true,
        // Admins may cancel before fulfilment starts; cancelling a paid
        // order raises a refund obligation.
        (Actor::Admin, Pending, Cancelled) => true,
        (Actor::Admin, Paid, Cancelled) => true,
        // Manual fulfilment advances one step at a time, forward only.
        (Actor::Admin, Paid, Preparing) => true,
        (Actor::Admin, Preparing, Shipped) => true,
        (Actor::Admin, Shipped, Delivered) => true,
        _ => false,
    }
}

#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    stock: StockLedger,
    event_sender: Arc<EventSender>,
}

impl OrderLifecycleService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        stock: StockLedger,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            stock,
            event_sender,
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Applies one transition. Returns the updated order; fails with
    /// `InvalidTransition` for unlisted pairs (state unchanged) and with
    /// `ConcurrentModification` when another caller won the version race.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let from = order.status;

        if !transition_allowed(actor, from, to) {
            // Legitimate callers never attempt illegal transitions; log as a
            // likely client or race bug.
            warn!(from = %from, to = %to, ?actor, "illegal transition attempted");
            return Err(ServiceError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        // Conditional update on (id, version): losing the race leaves the
        // row untouched and surfaces as a retryable conflict.
        let updated = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::Version, Expr::value(order.version + 1))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&*self.db)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        if to == OrderStatus::Cancelled {
            self.release_order_stock(order_id).await?;
            if from == OrderStatus::Paid {
                self.flag_refund_due(&order).await?;
            }
            self.event_sender
                .send_or_log(Event::OrderCancelled {
                    order_id,
                    reason: reason.unwrap_or("unspecified").to_string(),
                })
                .await;
        }

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: from.to_string(),
                new_status: to.to_string(),
            })
            .await;

        info!(from = %from, to = %to, "order transitioned");
        self.get_order(order_id).await
    }

    /// Admin one-step advance along the fulfilment path.
    pub async fn advance(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        self.transition(order_id, target, Actor::Admin, None).await
    }

    /// Admin cancellation; legal from `pending` and `paid` only.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        self.transition(order_id, OrderStatus::Cancelled, Actor::Admin, Some(reason))
            .await
    }

    /// Returns every unit the order still holds, including reservations the
    /// payment webhook already committed. Idempotent, so racing cancellation
    /// paths are safe.
    async fn release_order_stock(&self, order_id: Uuid) -> Result<(), ServiceError> {
        self.stock.release_for_order(order_id).await
    }

    /// Flips the order's approved payment to refund-due and emits the signal
    /// the out-of-core refund process listens for.
    async fn flag_refund_due(&self, order: &order::Model) -> Result<(), ServiceError> {
        let flipped = Payment::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(payment::PaymentStatus::RefundDue),
            )
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::Status.eq(payment::PaymentStatus::Approved))
            .exec(&*self.db)
            .await?;

        if flipped.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::RefundDue {
                    order_id: order.id,
                    amount_minor: order.total_minor,
                })
                .await;
        }
        Ok(())
    }
}
