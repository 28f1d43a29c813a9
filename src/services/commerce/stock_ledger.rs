use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Condition, Expr},
    ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::commerce::{product, Product};
use crate::errors::ServiceError;

/// Stock counter mutations, always run inside the caller's transaction.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Takes `quantity` units out of stock or fails with `OutOfStock`.
    async fn decrement(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError>;

    /// Puts `quantity` units back. Deleted products are skipped.
    async fn restore(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError>;
}

/// Ledger over the `products.stock` column.
#[derive(Clone, Debug, Default)]
pub struct ProductStockLedger;

#[async_trait]
impl StockLedger for ProductStockLedger {
    async fn decrement(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::ProductUnavailable(product_id))?;

        if !product.track_stock {
            return Ok(());
        }

        // Single conditional write; the guard re-checks stock at write time.
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(
                Condition::any()
                    .add(product::Column::AllowBackorders.eq(true))
                    .add(product::Column::Stock.gte(quantity)),
            )
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            debug!(%product_id, quantity, "stock decrement refused");
            return Err(ServiceError::OutOfStock {
                product_id,
                requested: quantity,
            });
        }

        Ok(())
    }

    async fn restore(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let Some(product) = Product::find_by_id(product_id).one(txn).await? else {
            warn!(%product_id, quantity, "skipping stock restore for deleted product");
            return Ok(());
        };

        if !product.track_stock || quantity <= 0 {
            return Ok(());
        }

        Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(txn)
            .await?;

        Ok(())
    }
}
