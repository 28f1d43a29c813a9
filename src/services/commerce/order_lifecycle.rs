use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::commerce::{
        order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderPaymentStatus,
        OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::stock_ledger::{ProductStockLedger, StockLedger},
};

/// Order with its frozen line snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Order state machine: cancellation, payment confirmation and fulfilment.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    stock_ledger: Arc<dyn StockLedger>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            stock_ledger: Arc::new(ProductStockLedger),
        }
    }

    pub fn with_stock_ledger(mut self, stock_ledger: Arc<dyn StockLedger>) -> Self {
        self.stock_ledger = stock_ledger;
        self
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_items(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_order_with_items(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = self.get_order(order_id).await?;
        let items = self.get_order_items(order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Orders placed by a user, newest first.
    pub async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Cancels a pending, confirmed or processing order and restores stock
    /// for every item in the same transaction.
    ///
    /// A paid order is labelled `refunded` on its payment axis; no gateway
    /// refund is issued here.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;
        let current = Self::load_order(&txn, order_id).await?;

        if !current.status.is_cancellable() {
            return Err(ServiceError::OrderNotCancellable(format!(
                "order {} is {}",
                current.order_number, current.status
            )));
        }

        let now = Utc::now();
        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(order::Column::CancellationReason, Expr::value(reason))
            .col_expr(order::Column::CancelledAt, Expr::value(Some(now)))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(OrderStatus::CANCELLABLE))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::OrderNotCancellable(format!(
                "order {} changed status concurrently",
                current.order_number
            )));
        }

        Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Refunded),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(OrderPaymentStatus::Paid))
            .exec(&txn)
            .await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in &items {
            self.stock_ledger
                .restore(&txn, item.product_id, item.quantity)
                .await?;
        }

        let cancelled = Self::load_order(&txn, order_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        info!(order_number = %cancelled.order_number, restored_lines = items.len(), "order cancelled");
        Ok(cancelled)
    }

    /// Marks the order paid inside the reconciliation transaction.
    ///
    /// Status only moves `pending -> confirmed`. An order cancelled while the
    /// payment was in flight keeps its status and its payment axis is
    /// labelled `refunded`, since the captured money is owed back. Repeat
    /// calls are no-ops.
    pub async fn mark_paid(
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let current = Self::load_order(txn, order_id).await?;
        if current.payment_status == OrderPaymentStatus::Paid {
            return Ok(current);
        }
        if current.status == OrderStatus::Cancelled {
            return Self::flag_refund_due(txn, current).await;
        }
        if !current
            .payment_status
            .can_transition_to(OrderPaymentStatus::Paid)
        {
            return Err(ServiceError::invalid_transition(
                current.payment_status,
                OrderPaymentStatus::Paid,
            ));
        }

        let now = Utc::now();
        let mut update = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Paid),
            )
            .col_expr(
                order::Column::PaidAt,
                Expr::value(Some(current.paid_at.unwrap_or(now))),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.status))
            .filter(order::Column::PaymentStatus.eq(current.payment_status));
        if current.status == OrderStatus::Pending {
            update = update.col_expr(order::Column::Status, Expr::value(OrderStatus::Confirmed));
        }

        if update.exec(txn).await?.rows_affected == 0 {
            // Cancelled between the read and the write.
            let latest = Self::load_order(txn, order_id).await?;
            if latest.status == OrderStatus::Cancelled {
                return Self::flag_refund_due(txn, latest).await;
            }
            return Err(ServiceError::invalid_transition(
                latest.payment_status,
                OrderPaymentStatus::Paid,
            ));
        }

        Self::load_order(txn, order_id).await
    }

    async fn flag_refund_due(
        txn: &DatabaseTransaction,
        order: OrderModel,
    ) -> Result<OrderModel, ServiceError> {
        warn!(
            order_number = %order.order_number,
            "payment captured for a cancelled order; refund due"
        );
        let now = Utc::now();
        Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Refunded),
            )
            .col_expr(
                order::Column::PaidAt,
                Expr::value(Some(order.paid_at.unwrap_or(now))),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Cancelled))
            .exec(txn)
            .await?;
        Self::load_order(txn, order.id).await
    }

    /// Moves an order along the fulfilment path.
    #[instrument(skip(self))]
    pub async fn advance(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if !matches!(
            next,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "status {} cannot be set directly",
                next
            )));
        }

        let txn = self.db.begin().await?;
        let current = Self::load_order(&txn, order_id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::invalid_transition(current.status, next));
        }

        let now = Utc::now();
        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(next))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        update = match next {
            OrderStatus::Shipped => update.col_expr(order::Column::ShippedAt, Expr::value(Some(now))),
            OrderStatus::Delivered => {
                update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)))
            }
            _ => update,
        };
        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        let updated = Self::load_order(&txn, order_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.status.to_string(),
                new_status: next.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Mirrors a refund onto the order. Returns the order as it was before,
    /// so a failed gateway refund can put it back.
    pub(crate) async fn apply_refund(
        txn: &DatabaseTransaction,
        order_id: Uuid,
        fully_refunded: bool,
    ) -> Result<OrderModel, ServiceError> {
        let previous = Self::load_order(txn, order_id).await?;
        let payment_status = if fully_refunded {
            OrderPaymentStatus::Refunded
        } else {
            OrderPaymentStatus::PartiallyRefunded
        };

        let mut active: order::ActiveModel = previous.clone().into();
        if previous.payment_status.can_transition_to(payment_status) {
            active.payment_status = Set(payment_status);
        }
        if fully_refunded && previous.status.can_transition_to(OrderStatus::Refunded) {
            active.status = Set(OrderStatus::Refunded);
        }
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
        Ok(previous)
    }

    /// Restores the status columns captured by [`OrderService::apply_refund`].
    pub(crate) async fn revert_refund(
        txn: &DatabaseTransaction,
        previous: &OrderModel,
    ) -> Result<(), ServiceError> {
        Order::update_many()
            .col_expr(order::Column::Status, Expr::value(previous.status))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(previous.payment_status),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(previous.id))
            .exec(txn)
            .await?;
        Ok(())
    }

    async fn load_order(
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
