use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product as seen by the transaction engine.
///
/// Only the fields checkout needs are modelled here: the active flag, price,
/// snapshot fields for order items and the trackable stock counter.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    pub is_active: bool,
    /// When false the stock counter is ignored entirely.
    pub track_stock: bool,
    pub stock: i32,
    pub allow_backorders: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether `quantity` units can be sold right now.
    pub fn can_fulfill(&self, quantity: i32) -> bool {
        !self.track_stock || self.allow_backorders || self.stock >= quantity
    }

    /// Units available for sale, `None` when stock is not a constraint.
    pub fn available_stock(&self) -> Option<i32> {
        if !self.track_stock || self.allow_backorders {
            None
        } else {
            Some(self.stock.max(0))
        }
    }
}
