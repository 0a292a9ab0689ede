use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. The commerce core reads these rows; catalog CRUD lives
/// outside the core. `stock` is the number of base units still available,
/// i.e. on-hand minus open reservations.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    /// Price of one base unit, in minor currency units.
    pub price_minor: i64,
    pub stock: i32,
    /// When false the product is only purchasable through a pack variant.
    pub allow_individual_sale: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pack_variant::Entity")]
    PackVariants,
}

impl Related<super::pack_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackVariants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
