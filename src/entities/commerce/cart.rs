use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shopping cart entity.
///
/// Ownership is persisted as an `(owner_type, owner_id)` pair and surfaced
/// through [`Model::owner`] as a [`CartOwner`], so a cart can never belong to
/// both a user and a session.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_id: String,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Discriminator column for [`CartOwner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OwnerType {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "session")]
    Session,
}

/// The single owner of a cart: a signed-in user or an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

impl CartOwner {
    /// Column values used to persist this owner.
    pub fn to_columns(&self) -> (OwnerType, String) {
        match self {
            CartOwner::User(id) => (OwnerType::User, id.to_string()),
            CartOwner::Session(id) => (OwnerType::Session, id.clone()),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }
}

impl Model {
    /// Rebuilds the owner from its persisted columns.
    ///
    /// A user row whose id fails to parse is reported as a session owner so
    /// that it can never be mistaken for another user's cart.
    pub fn owner(&self) -> CartOwner {
        match self.owner_type {
            OwnerType::User => match Uuid::parse_str(&self.owner_id) {
                Ok(id) => CartOwner::User(id),
                Err(_) => CartOwner::Session(self.owner_id.clone()),
            },
            OwnerType::Session => CartOwner::Session(self.owner_id.clone()),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.owner().user_id()
    }
}
