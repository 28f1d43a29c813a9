use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::commerce::OrderModel;

/// Represents a notification
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub recipient: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Types of notifications
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderConfirmation,
    OrderCancelled,
    RefundProcessed,
}

impl Notification {
    pub fn order_confirmation(order: &OrderModel, user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            recipient: order.customer_email.clone(),
            notification_type: NotificationType::OrderConfirmation,
            subject: format!("Order {} confirmed", order.order_number),
            message: format!(
                "Payment of {} {} received for order {}.",
                order.currency,
                order.total.round_dp(2),
                order.order_number
            ),
            created_at: Utc::now(),
        }
    }

    pub fn refund_processed(order: &OrderModel, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            recipient: order.customer_email.clone(),
            notification_type: NotificationType::RefundProcessed,
            subject: format!("Refund for order {}", order.order_number),
            message: format!(
                "A refund of {} {} has been issued for order {}.",
                order.currency,
                amount.round_dp(2),
                order.order_number
            ),
            created_at: Utc::now(),
        }
    }
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound customer notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log; stands in until a mail or SMS
/// transport is wired.
#[derive(Clone, Debug, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        let body = serde_json::to_string(&notification)?;
        info!(
            recipient = %notification.recipient,
            kind = ?notification.notification_type,
            %body,
            "notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::commerce::{OrderPaymentStatus, OrderStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn order() -> OrderModel {
        let now = Utc::now();
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "ORD-20240101-ABCDEFGH".into(),
            user_id: None,
            customer_email: "buyer@example.com".into(),
            status: OrderStatus::Confirmed,
            payment_status: OrderPaymentStatus::Paid,
            payment_method: PaymentMethod::Card,
            currency: "NGN".into(),
            subtotal: dec!(7000),
            discount_amount: dec!(700),
            tax_amount: dec!(0),
            total: dec!(6300),
            coupon_code: Some("SAVE10".into()),
            billing_address: serde_json::json!({}),
            shipping_address: serde_json::json!({}),
            notes: None,
            cancellation_reason: None,
            cancelled_at: None,
            paid_at: Some(now),
            shipped_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn confirmation_addresses_the_order_email() {
        let n = Notification::order_confirmation(&order(), None);
        assert_eq!(n.recipient, "buyer@example.com");
        assert_eq!(n.notification_type, NotificationType::OrderConfirmation);
        assert!(n.subject.contains("ORD-20240101-ABCDEFGH"));
        assert!(n.message.contains("6300"));
    }

    #[tokio::test]
    async fn mock_records_a_single_send() {
        let mut mock = MockNotificationService::new();
        mock.expect_send().times(1).returning(|_| Ok(()));
        mock.send(Notification::order_confirmation(&order(), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn log_service_accepts_notifications() {
        LogNotificationService
            .send(Notification::refund_processed(&order(), dec!(100)))
            .await
            .unwrap();
    }
}
