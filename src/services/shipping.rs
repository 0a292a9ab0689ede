//! Flat-rate shipping table keyed by commune.

use crate::{
    entities::{shipping_zone_rate, ShippingZoneRate},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct ShippingRate {
    pub commune: String,
    pub cost_minor: i64,
    pub lead_time_days: i32,
}

impl From<shipping_zone_rate::Model> for ShippingRate {
    fn from(row: shipping_zone_rate::Model) -> Self {
        Self {
            commune: row.commune,
            cost_minor: row.cost_minor,
            lead_time_days: row.lead_time_days,
        }
    }
}

#[derive(Clone)]
pub struct ShippingRateTable {
    db: Arc<DatabaseConnection>,
}

impl ShippingRateTable {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Rate lookup, case-insensitive on the commune name. Communes are
    /// stored lowercase; an unmatched commune means the store does not ship
    /// there.
    #[instrument(skip(self))]
    pub async fn rate_for_commune(&self, commune: &str) -> Result<ShippingRate, ServiceError> {
        let needle = commune.trim().to_lowercase();
        ShippingZoneRate::find()
            .filter(shipping_zone_rate::Column::Commune.eq(needle))
            .one(&*self.db)
            .await?
            .map(ShippingRate::from)
            .ok_or_else(|| ServiceError::UnknownShippingZone(commune.to_string()))
    }

    /// All served communes, for address forms.
    pub async fn list_rates(&self) -> Result<Vec<ShippingRate>, ServiceError> {
        Ok(ShippingZoneRate::find()
            .order_by_asc(shipping_zone_rate::Column::Commune)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(ShippingRate::from)
            .collect())
    }
}
