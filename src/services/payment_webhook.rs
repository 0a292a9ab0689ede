//! Gateway webhook ingestion.
//!
//! The gateway delivers at-least-once, so every notification carries a
//! gateway transaction id and the processor dedupes on it: the first
//! delivery drives the order transition, every replay acknowledges without
//! side effects. A unique index on `payments.transaction_id` backs the
//! check, so even two concurrent deliveries of the same notification cannot
//! both win.

use crate::{
    entities::{
        order::{self, OrderStatus},
        payment::{self, PaymentStatus},
        Order, Payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        orders::{Actor, OrderLifecycleService},
        stock::StockLedger,
    },
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Payment outcome as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Approved,
    Rejected,
    Expired,
}

/// Decoded webhook payload after signature verification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    /// Gateway-side transaction id; the idempotency key for ingestion.
    pub transaction_id: String,
    /// Intent reference handed out at checkout.
    pub external_reference: String,
    pub outcome: GatewayOutcome,
    #[serde(default)]
    pub status_detail: Option<String>,
}

/// What happened to a notification. Every variant is acknowledged with 200
/// so the gateway stops retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// First delivery; the order transition was applied.
    Processed,
    /// Replay of an already ingested transaction; no side effects.
    Duplicate,
    /// Valid notification for an order no longer pending; recorded for
    /// audit, no transition.
    Recorded,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    db: Arc<DatabaseConnection>,
    lifecycle: OrderLifecycleService,
    stock: StockLedger,
    event_sender: Arc<EventSender>,
}

impl WebhookProcessor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        lifecycle: OrderLifecycleService,
        stock: StockLedger,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            lifecycle,
            stock,
            event_sender,
        }
    }

    /// Ingests one verified notification. Storage errors bubble up so the
    /// handler can answer 503 and let the gateway redeliver.
    #[instrument(skip(self), fields(transaction_id = %notification.transaction_id))]
    pub async fn process(
        &self,
        notification: WebhookNotification,
    ) -> Result<Ack, ServiceError> {
        let already = Payment::find()
            .filter(payment::Column::TransactionId.eq(notification.transaction_id.as_str()))
            .one(&*self.db)
            .await?;
        if already.is_some() {
            info!("duplicate webhook delivery ignored");
            return Ok(Ack::Duplicate);
        }

        let order = Order::find()
            .filter(order::Column::ExternalReference.eq(notification.external_reference.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::UnknownOrder(notification.external_reference.clone())
            })?;

        let ack = if order.status == OrderStatus::Pending {
            match notification.outcome {
                GatewayOutcome::Approved => self.approve(&order, &notification).await?,
                GatewayOutcome::Rejected | GatewayOutcome::Expired => {
                    self.reject(&order, &notification).await?
                }
            }
        } else {
            // Late or out-of-band notification (sweep already cancelled, or
            // fulfilment already started). Keep the record, leave the order.
            warn!(order_id = %order.id, status = %order.status, "notification for non-pending order recorded only");
            self.record(&order, &notification, PaymentStatus::from_outcome(notification.outcome))
                .await?;
            Ack::Recorded
        };

        Ok(ack)
    }

    async fn approve(
        &self,
        order: &order::Model,
        notification: &WebhookNotification,
    ) -> Result<Ack, ServiceError> {
        // Claim the pending intent row before the transition; the unique
        // transaction_id column makes a racing duplicate fail here instead
        // of double-transitioning.
        let claimed = Payment::update_many()
            .col_expr(
                payment::Column::TransactionId,
                Expr::value(notification.transaction_id.clone()),
            )
            .col_expr(
                payment::Column::Status,
                Expr::value(PaymentStatus::Approved),
            )
            .col_expr(payment::Column::ApprovedAt, Expr::value(Utc::now()))
            .col_expr(
                payment::Column::StatusDetail,
                Expr::value(notification.status_detail.clone()),
            )
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .filter(payment::Column::TransactionId.is_null())
            .exec(&*self.db)
            .await?;
        if claimed.rows_affected == 0 {
            self.record(order, notification, PaymentStatus::Approved)
                .await?;
        }

        self.lifecycle
            .transition(order.id, OrderStatus::Paid, Actor::Gateway, None)
            .await?;

        for token in self.stock.open_reservations_for_order(order.id).await? {
            self.stock.commit(token).await?;
        }

        self.event_sender
            .send_or_log(Event::PaymentApproved {
                order_id: order.id,
                transaction_id: notification.transaction_id.clone(),
            })
            .await;

        info!(order_id = %order.id, "payment approved, order paid");
        Ok(Ack::Processed)
    }

    async fn reject(
        &self,
        order: &order::Model,
        notification: &WebhookNotification,
    ) -> Result<Ack, ServiceError> {
        self.record(order, notification, PaymentStatus::Rejected)
            .await?;

        // Cancellation through the lifecycle releases the order's
        // reservations.
        self.lifecycle
            .transition(
                order.id,
                OrderStatus::Cancelled,
                Actor::Gateway,
                notification.status_detail.as_deref().or(Some("payment rejected")),
            )
            .await?;

        self.event_sender
            .send_or_log(Event::PaymentRejected {
                order_id: order.id,
                transaction_id: notification.transaction_id.clone(),
            })
            .await;

        info!(order_id = %order.id, "payment rejected, order cancelled");
        Ok(Ack::Processed)
    }

    /// Audit row for notifications that must be remembered without driving
    /// a transition.
    async fn record(
        &self,
        order: &order::Model,
        notification: &WebhookNotification,
        status: PaymentStatus,
    ) -> Result<(), ServiceError> {
        let row = payment::ActiveModel {
            id: Set(uuid::Uuid::new_v4()),
            order_id: Set(order.id),
            transaction_id: Set(Some(notification.transaction_id.clone())),
            status: Set(status),
            amount_minor: Set(order.total_minor),
            status_detail: Set(notification.status_detail.clone()),
            created_at: Set(Utc::now()),
            approved_at: Set(match status {
                PaymentStatus::Approved => Some(Utc::now()),
                _ => None,
            }),
        };
        row.insert(&*self.db).await?;
        Ok(())
    }
}

impl PaymentStatus {
    fn from_outcome(outcome: GatewayOutcome) -> Self {
        match outcome {
            GatewayOutcome::Approved => PaymentStatus::Approved,
            GatewayOutcome::Rejected | GatewayOutcome::Expired => PaymentStatus::Rejected,
        }
    }
}
