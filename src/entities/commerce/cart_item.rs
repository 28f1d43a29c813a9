use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cart line. `price` is the product price captured when the line was added.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Json", nullable)]
    pub options: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cart::Entity",
        from = "Column::CartId",
        to = "super::cart::Column::Id",
        on_delete = "Cascade"
    )]
    Cart,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::cart::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cart.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Two lines are the same line when product and options match.
    pub fn matches(&self, product_id: Uuid, options: Option<&Json>) -> bool {
        self.product_id == product_id && normalize_options(self.options.as_ref()) == normalize_options(options)
    }
}

/// Treats a missing options value, JSON null and an empty object as equivalent.
pub fn normalize_options(options: Option<&Json>) -> Option<&Json> {
    match options {
        None | Some(Json::Null) => None,
        Some(Json::Object(map)) if map.is_empty() => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(options: Option<Json>) -> Model {
        Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            quantity: 1,
            price: dec!(10),
            subtotal: dec!(10),
            options,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_options_match_missing_options() {
        let item = line(Some(json!({})));
        assert!(item.matches(Uuid::nil(), None));
        assert!(item.matches(Uuid::nil(), Some(&Json::Null)));
    }

    #[test]
    fn options_compare_by_value_not_key_order() {
        let item = line(Some(json!({"size": "M", "color": "red"})));
        assert!(item.matches(Uuid::nil(), Some(&json!({"color": "red", "size": "M"}))));
        assert!(!item.matches(Uuid::nil(), Some(&json!({"color": "blue", "size": "M"}))));
    }

    #[test]
    fn different_product_never_matches() {
        let item = line(None);
        assert!(!item.matches(Uuid::new_v4(), None));
    }
}
