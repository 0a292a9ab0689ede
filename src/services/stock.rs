//! Stock ledger: the one place in the core that needs real mutual exclusion.
//!
//! Reservation is a conditional single-statement decrement
//! (`UPDATE products SET stock = stock - n WHERE id = ? AND stock >= n`), so
//! two racing reservations that together exceed availability can never both
//! succeed. Each successful reserve writes a `stock_reservations` row whose
//! id is the opaque token; release and commit are status-filtered updates
//! and therefore idempotent.

use crate::{
    entities::{product, stock_reservation, Product, StockReservation},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Opaque handle for one successful reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservationToken(pub Uuid);

#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Atomically reserves `base_units` of a product.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: Uuid,
        base_units: i32,
    ) -> Result<ReservationToken, ServiceError> {
        if base_units < 1 {
            return Err(ServiceError::ValidationError(format!(
                "reservation must be at least 1 base unit, got {}",
                base_units
            )));
        }

        let db = &*self.db;

        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(base_units),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(base_units))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            let available = self.availability(product_id).await?;
            return Err(ServiceError::InsufficientStock {
                product_id,
                requested: base_units,
                available,
            });
        }

        let token = Uuid::new_v4();
        let reservation = stock_reservation::ActiveModel {
            id: Set(token),
            order_id: Set(None),
            product_id: Set(product_id),
            base_units: Set(base_units),
            status: Set(stock_reservation::ReservationStatus::Reserved),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        reservation.insert(db).await?;

        self.event_sender
            .send_or_log(Event::StockReserved {
                product_id,
                base_units,
                reservation_id: token,
            })
            .await;

        info!(product_id = %product_id, base_units, reservation_id = %token, "stock reserved");
        Ok(ReservationToken(token))
    }

    /// Returns a reservation's units to the product. Releasing an already
    /// released, committed, or unknown token is a no-op: cancellation paths
    /// race with webhook-driven release and both may try. The status flip and
    /// the stock credit land in one transaction so units cannot be lost
    /// between them.
    #[instrument(skip(self))]
    pub async fn release(&self, token: ReservationToken) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        // Flip reserved -> released first; only the caller that wins this
        // update may return the units.
        let flipped = StockReservation::update_many()
            .col_expr(
                stock_reservation::Column::Status,
                Expr::value(stock_reservation::ReservationStatus::Released),
            )
            .col_expr(stock_reservation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_reservation::Column::Id.eq(token.0))
            .filter(
                stock_reservation::Column::Status
                    .eq(stock_reservation::ReservationStatus::Reserved),
            )
            .exec(&txn)
            .await?;

        if flipped.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(());
        }

        let reservation = StockReservation::find_by_id(token.0)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("reservation {} vanished after flip", token.0))
            })?;

        Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(reservation.base_units),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(reservation.product_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::StockReleased {
                product_id: reservation.product_id,
                base_units: reservation.base_units,
                reservation_id: token.0,
            })
            .await;

        info!(reservation_id = %token.0, base_units = reservation.base_units, "stock released");
        Ok(())
    }

    /// Reclaims every unit an order still holds, reserved or committed.
    /// Cancellation of a paid order must return stock the webhook already
    /// committed, so this flips both statuses to released and credits the
    /// units back, all in one transaction. Idempotent: rows already released
    /// are skipped.
    #[instrument(skip(self))]
    pub async fn release_for_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let open: Vec<stock_reservation::Model> = StockReservation::find()
            .filter(stock_reservation::Column::OrderId.eq(order_id))
            .filter(stock_reservation::Column::Status.is_in([
                stock_reservation::ReservationStatus::Reserved,
                stock_reservation::ReservationStatus::Committed,
            ]))
            .all(&txn)
            .await?;

        let mut released = Vec::with_capacity(open.len());
        for reservation in open {
            let flipped = StockReservation::update_many()
                .col_expr(
                    stock_reservation::Column::Status,
                    Expr::value(stock_reservation::ReservationStatus::Released),
                )
                .col_expr(stock_reservation::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_reservation::Column::Id.eq(reservation.id))
                .filter(stock_reservation::Column::Status.is_in([
                    stock_reservation::ReservationStatus::Reserved,
                    stock_reservation::ReservationStatus::Committed,
                ]))
                .exec(&txn)
                .await?;
            if flipped.rows_affected == 0 {
                continue;
            }

            Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(reservation.base_units),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(reservation.product_id))
                .exec(&txn)
                .await?;

            released.push(reservation);
        }

        txn.commit().await?;

        for reservation in released {
            self.event_sender
                .send_or_log(Event::StockReleased {
                    product_id: reservation.product_id,
                    base_units: reservation.base_units,
                    reservation_id: reservation.id,
                })
                .await;
            info!(
                order_id = %order_id,
                reservation_id = %reservation.id,
                base_units = reservation.base_units,
                "stock released on cancellation"
            );
        }
        Ok(())
    }

    /// Marks a reservation as consumed by a paid order. Committed units no
    /// longer respond to token-level `release` or the expiry sweep; only
    /// order cancellation (`release_for_order`) can still return them.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn commit(&self, token: ReservationToken) -> Result<(), ServiceError> {
        let committed = StockReservation::update_many()
            .col_expr(
                stock_reservation::Column::Status,
                Expr::value(stock_reservation::ReservationStatus::Committed),
            )
            .col_expr(stock_reservation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_reservation::Column::Id.eq(token.0))
            .filter(
                stock_reservation::Column::Status
                    .eq(stock_reservation::ReservationStatus::Reserved),
            )
            .exec(&*self.db)
            .await?;

        if committed.rows_affected == 0 {
            warn!(reservation_id = %token.0, "commit skipped; reservation not in reserved state");
        }
        Ok(())
    }

    /// Links freshly taken reservations to the order that consumed them so
    /// cancellation can find and release them later.
    pub async fn attach_to_order(
        &self,
        tokens: &[ReservationToken],
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let ids: Vec<Uuid> = tokens.iter().map(|t| t.0).collect();
        StockReservation::update_many()
            .col_expr(stock_reservation::Column::OrderId, Expr::value(order_id))
            .col_expr(stock_reservation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_reservation::Column::Id.is_in(ids))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Open (still reserved) reservation tokens attached to an order.
    pub async fn open_reservations_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<ReservationToken>, ServiceError> {
        let rows = StockReservation::find()
            .filter(stock_reservation::Column::OrderId.eq(order_id))
            .filter(
                stock_reservation::Column::Status
                    .eq(stock_reservation::ReservationStatus::Reserved),
            )
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|r| ReservationToken(r.id)).collect())
    }

    /// Current available (unreserved) stock, for advisory cart checks.
    pub async fn availability(&self, product_id: Uuid) -> Result<i32, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        Ok(product.stock)
    }
}
