use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attempt to collect the order total through the gateway.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    #[sea_orm(unique)]
    pub reference: String,
    pub gateway: String,
    pub status: PaymentStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub refunded_amount: Decimal,
    pub currency: String,
    #[sea_orm(nullable)]
    pub channel: Option<String>,
    #[sea_orm(nullable)]
    pub gateway_response: Option<String>,
    #[sea_orm(nullable)]
    pub authorization_url: Option<String>,
    #[sea_orm(nullable)]
    pub access_code: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub metadata: Option<Json>,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Optimistic lock for refund bookkeeping.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::refund::Entity")]
    Refunds,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::refund::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Refunds.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Amount still available for refunds.
    pub fn refundable_amount(&self) -> Decimal {
        (self.amount - self.refunded_amount).max(Decimal::ZERO)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partially_refunded")]
    PartiallyRefunded,
}

impl PaymentStatus {
    /// Statuses a confirmed gateway success may be recorded over.
    pub const SETTLEABLE: [PaymentStatus; 3] =
        [PaymentStatus::Pending, PaymentStatus::Processing, PaymentStatus::Failed];

    /// Statuses a confirmed gateway failure may be recorded over.
    pub const FAILABLE: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Processing];

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Success | Failed | Cancelled)
                | (Processing, Success | Failed | Cancelled)
                | (Failed, Success)
                | (Success | PartiallyRefunded, Refunded | PartiallyRefunded)
        )
    }

    /// Whether funds were captured for this payment at some point.
    pub fn is_captured(self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
        )
    }

    pub fn is_refundable(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::PartiallyRefunded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_final_except_for_refunds() {
        use PaymentStatus::*;
        for next in [Pending, Processing, Failed, Cancelled, Success] {
            assert!(!Success.can_transition_to(next), "success -> {next}");
        }
        assert!(Success.can_transition_to(Refunded));
        assert!(Success.can_transition_to(PartiallyRefunded));
    }

    #[test]
    fn settleable_statuses_agree_with_table() {
        for status in PaymentStatus::SETTLEABLE {
            assert!(status.can_transition_to(PaymentStatus::Success));
        }
        for status in PaymentStatus::FAILABLE {
            assert!(status.can_transition_to(PaymentStatus::Failed));
        }
    }
}
