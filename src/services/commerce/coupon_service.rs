use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::commerce::{
        coupon::{self, normalize_code},
        coupon_usage, Coupon, CouponModel, CouponType, CouponUsage,
    },
    errors::ServiceError,
    services::commerce::pricing_service::round_currency,
};

/// Result of checking a coupon against a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl CouponValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Converts a failed validation into `CouponInvalid`.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.valid {
            Ok(())
        } else {
            Err(ServiceError::CouponInvalid(
                self.reason.unwrap_or_else(|| "Coupon is not valid".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 3, max = 64))]
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1))]
    pub usage_limit_per_user: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Coupon validation, discount computation and redemption.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        input.validate()?;

        if input.value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Coupon value must be positive".to_string(),
            ));
        }
        if input.coupon_type == CouponType::Percentage && input.value > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "Percentage coupons cannot exceed 100".to_string(),
            ));
        }
        if let (Some(starts), Some(expires)) = (input.starts_at, input.expires_at) {
            if expires <= starts {
                return Err(ServiceError::ValidationError(
                    "Coupon must expire after it starts".to_string(),
                ));
            }
        }

        let code = normalize_code(&input.code);
        if self.find_by_code(&code).await?.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            coupon_type: Set(input.coupon_type),
            value: Set(input.value),
            minimum_order_amount: Set(input.minimum_order_amount),
            maximum_discount_amount: Set(input.maximum_discount_amount),
            usage_limit: Set(input.usage_limit),
            usage_limit_per_user: Set(input.usage_limit_per_user),
            times_used: Set(0),
            is_active: Set(true),
            starts_at: Set(input.starts_at),
            expires_at: Set(input.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(coupon_id = %coupon.id, "coupon created");
        Ok(coupon)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        Self::find_by_code_with(&*self.db, code).await
    }

    pub async fn find_by_code_with<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<Option<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .filter(coupon::Column::Code.eq(normalize_code(code)))
            .one(conn)
            .await?)
    }

    /// Checks every redemption rule against a subtotal and optional user.
    pub async fn validate(
        &self,
        coupon: &CouponModel,
        subtotal: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<CouponValidation, ServiceError> {
        Self::validate_with(&*self.db, coupon, subtotal, user_id).await
    }

    /// [`CouponService::validate`] on an explicit connection or transaction.
    pub async fn validate_with<C: ConnectionTrait>(
        conn: &C,
        coupon: &CouponModel,
        subtotal: Decimal,
        user_id: Option<Uuid>,
    ) -> Result<CouponValidation, ServiceError> {
        let now = Utc::now();

        if !coupon.is_active {
            return Ok(CouponValidation::invalid("Coupon is not active"));
        }
        if coupon.starts_at.is_some_and(|starts| starts > now) {
            return Ok(CouponValidation::invalid("Coupon is not yet valid"));
        }
        if coupon.expires_at.is_some_and(|expires| expires <= now) {
            return Ok(CouponValidation::invalid("Coupon has expired"));
        }
        if coupon
            .usage_limit
            .is_some_and(|limit| coupon.times_used >= limit)
        {
            return Ok(CouponValidation::invalid("Coupon usage limit reached"));
        }
        if let (Some(limit), Some(user_id)) = (coupon.usage_limit_per_user, user_id) {
            let used = Self::usage_count_for_user(conn, coupon.id, user_id).await?;
            if used >= limit as u64 {
                return Ok(CouponValidation::invalid(
                    "Coupon already used the maximum number of times",
                ));
            }
        }
        if let Some(minimum) = coupon.minimum_order_amount {
            if subtotal < minimum {
                return Ok(CouponValidation::invalid(format!(
                    "Order subtotal must be at least {}",
                    round_currency(minimum)
                )));
            }
        }

        Ok(CouponValidation::ok())
    }

    async fn usage_count_for_user<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, ServiceError> {
        Ok(CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .count(conn)
            .await?)
    }

    /// Discount for `subtotal`, rounded, within `[0, subtotal]`.
    pub fn calculate_discount(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let raw = match coupon.coupon_type {
            CouponType::Percentage => {
                let discount = subtotal * coupon.value / Decimal::ONE_HUNDRED;
                match coupon.maximum_discount_amount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            CouponType::Fixed => coupon.value.min(subtotal),
        };

        round_currency(raw).max(Decimal::ZERO).min(subtotal)
    }

    /// Records a redemption inside the checkout transaction.
    ///
    /// The counter increment is conditional on the global limit and runs
    /// first; the per-user count is read after it on the same transaction.
    /// A refusal leaves the caller to roll the transaction back.
    #[instrument(skip(txn, coupon), fields(coupon_id = %coupon.id))]
    pub async fn redeem(
        txn: &DatabaseTransaction,
        coupon: &CouponModel,
        user_id: Option<Uuid>,
        order_id: Uuid,
        discount: Decimal,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::TimesUsed,
                Expr::col(coupon::Column::TimesUsed).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::TimesUsed)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            debug!("coupon redemption refused by usage limit");
            return Err(ServiceError::CouponInvalid(
                "Coupon usage limit reached".to_string(),
            ));
        }

        // The counter update holds the coupon row lock, so this count sees
        // every redemption committed before ours.
        if let (Some(limit), Some(user_id)) = (coupon.usage_limit_per_user, user_id) {
            let used = Self::usage_count_for_user(txn, coupon.id, user_id).await?;
            if used >= limit as u64 {
                debug!(%user_id, "coupon redemption refused by per-user limit");
                return Err(ServiceError::CouponInvalid(
                    "Coupon already used the maximum number of times".to_string(),
                ));
            }
        }

        coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            discount_amount: Set(discount),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn coupon(coupon_type: CouponType, value: Decimal, cap: Option<Decimal>) -> CouponModel {
        let now = Utc::now();
        CouponModel {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            coupon_type,
            value,
            minimum_order_amount: None,
            maximum_discount_amount: cap,
            usage_limit: None,
            usage_limit_per_user: None,
            times_used: 0,
            is_active: true,
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(CouponType::Percentage, dec!(10), Some(dec!(500)), dec!(10000), dec!(500))]
    #[case(CouponType::Percentage, dec!(10), None, dec!(7000), dec!(700))]
    #[case(CouponType::Percentage, dec!(15), None, dec!(33.33), dec!(5.00))]
    #[case(CouponType::Fixed, dec!(2000), None, dec!(1500), dec!(1500))]
    #[case(CouponType::Fixed, dec!(250), None, dec!(1500), dec!(250))]
    #[case(CouponType::Fixed, dec!(250), None, dec!(0), dec!(0))]
    fn discount_rules(
        #[case] kind: CouponType,
        #[case] value: Decimal,
        #[case] cap: Option<Decimal>,
        #[case] subtotal: Decimal,
        #[case] expected: Decimal,
    ) {
        let c = coupon(kind, value, cap);
        assert_eq!(CouponService::calculate_discount(&c, subtotal), expected);
    }

    #[test]
    fn failed_validation_maps_to_coupon_invalid() {
        let err = CouponValidation::invalid("Coupon has expired")
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ServiceError::CouponInvalid(reason) if reason == "Coupon has expired"));
        assert!(CouponValidation::ok().into_result().is_ok());
    }
}
