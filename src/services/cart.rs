//! Server-owned shopping cart, keyed by the authenticated user.
//!
//! Availability checks here are advisory only; the authoritative check is
//! `StockLedger::reserve` at checkout, because stock can change between a
//! cart edit and checkout.

use crate::{
    entities::{cart_item, pack_variant, CartItem, PackVariant, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{pricing, stock::StockLedger},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One cart line with resolved, advisory pricing attached.
#[derive(Debug, Clone, Serialize)]
pub struct PricedCartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub pack_variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    /// Base product units this line will consume at checkout.
    pub base_units: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    pub user_id: Uuid,
    pub lines: Vec<PricedCartLine>,
    pub subtotal_minor: i64,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    stock: StockLedger,
    event_sender: Arc<EventSender>,
}

impl CartService {
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

    /// Adds a selection to the user's cart; the same (product, variant)
    /// selection increments quantity instead of duplicating the line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        pack_variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<CartSnapshot, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }

        let existing = self.find_line(user_id, product_id, pack_variant_id).await?;
        let new_quantity = existing.as_ref().map_or(quantity, |l| l.quantity + quantity);

        self.validate_line(product_id, pack_variant_id, new_quantity)
            .await?;

        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(new_quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    pack_variant_id: Set(pack_variant_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                line.insert(&*self.db).await?;
            }
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id,
            })
            .await;

        info!(user_id = %user_id, product_id = %product_id, quantity = new_quantity, "cart line upserted");
        self.snapshot(user_id).await
    }

    /// Replaces a line's quantity. Quantity 0 removes the line. Concurrent
    /// edits from two sessions of the same user are last-write-wins.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        pack_variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<CartSnapshot, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must not be negative, got {}",
                quantity
            )));
        }
        if quantity == 0 {
            return self.remove_item(user_id, product_id, pack_variant_id).await;
        }

        self.validate_line(product_id, pack_variant_id, quantity)
            .await?;

        match self.find_line(user_id, product_id, pack_variant_id).await? {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    pack_variant_id: Set(pack_variant_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                line.insert(&*self.db).await?;
            }
        }

        self.snapshot(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        pack_variant_id: Option<Uuid>,
    ) -> Result<CartSnapshot, ServiceError> {
        let mut delete = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id));
        delete = match pack_variant_id {
            Some(v) => delete.filter(cart_item::Column::PackVariantId.eq(v)),
            None => delete.filter(cart_item::Column::PackVariantId.is_null()),
        };
        delete.exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                user_id,
                product_id,
            })
            .await;

        self.snapshot(user_id).await
    }

    /// The user's cart with resolved pricing, in stable (product, variant)
    /// order. Checkout consumes exactly this snapshot.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, user_id: Uuid) -> Result<CartSnapshot, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::ProductId)
            .order_by_asc(cart_item::Column::PackVariantId)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut subtotal_minor: i64 = 0;

        for item in items {
            let (product, variants) = self.load_product(item.product_id).await?;
            let resolved =
                pricing::resolve_line(&product, &variants, item.pack_variant_id, item.quantity)?;
            subtotal_minor = subtotal_minor
                .checked_add(resolved.line_total_minor)
                .ok_or_else(|| {
                    ServiceError::ValidationError("cart subtotal overflows".to_string())
                })?;
            lines.push(PricedCartLine {
                product_id: product.id,
                product_name: product.name,
                pack_variant_id: item.pack_variant_id,
                quantity: item.quantity,
                unit_price_minor: resolved.unit_price_minor,
                line_total_minor: resolved.line_total_minor,
                base_units: resolved.effective_units,
            });
        }

        Ok(CartSnapshot {
            user_id,
            lines,
            subtotal_minor,
        })
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;
        info!(user_id = %user_id, "cart cleared");
        Ok(())
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        pack_variant_id: Option<Uuid>,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        let mut query = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id));
        query = match pack_variant_id {
            Some(v) => query.filter(cart_item::Column::PackVariantId.eq(v)),
            None => query.filter(cart_item::Column::PackVariantId.is_null()),
        };
        Ok(query.one(&*self.db).await?)
    }

    async fn load_product(
        &self,
        product_id: Uuid,
    ) -> Result<(crate::entities::product::Model, Vec<pack_variant::Model>), ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        let variants = PackVariant::find()
            .filter(pack_variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        Ok((product, variants))
    }

    /// Prices the proposed line and checks it against currently available
    /// stock. Advisory: reservation happens only at checkout.
    async fn validate_line(
        &self,
        product_id: Uuid,
        pack_variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let (product, variants) = self.load_product(product_id).await?;
        if !product.active {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not available",
                product_id
            )));
        }
        let resolved = pricing::resolve_line(&product, &variants, pack_variant_id, quantity)?;

        let available = self.stock.availability(product_id).await?;
        if resolved.effective_units > available {
            return Err(ServiceError::InsufficientStock {
                product_id,
                requested: resolved.effective_units,
                available,
            });
        }
        Ok(())
    }
}
