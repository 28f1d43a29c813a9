use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Business operations have already committed by the time they emit.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartUpdated(Uuid),
    CartCleared(Uuid),
    CartsMerged {
        guest_cart_id: Uuid,
        user_cart_id: Uuid,
    },
    CouponApplied {
        cart_id: Uuid,
        code: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderPaid(Uuid),

    // Payment events
    PaymentInitialized(Uuid),
    PaymentSucceeded(Uuid),
    PaymentFailed(Uuid),
    RefundProcessed {
        payment_id: Uuid,
        refund_id: Uuid,
        amount: Decimal,
    },
    RefundFailed {
        payment_id: Uuid,
        refund_id: Uuid,
    },
    /// Money was captured for an order that is already cancelled.
    RefundRequired {
        order_id: Uuid,
        payment_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartUpdated(_) => "cart_updated",
            Event::CartCleared(_) => "cart_cleared",
            Event::CartsMerged { .. } => "carts_merged",
            Event::CouponApplied { .. } => "coupon_applied",
            Event::OrderCreated(_) => "order_created",
            Event::OrderCancelled(_) => "order_cancelled",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderPaid(_) => "order_paid",
            Event::PaymentInitialized(_) => "payment_initialized",
            Event::PaymentSucceeded(_) => "payment_succeeded",
            Event::PaymentFailed(_) => "payment_failed",
            Event::RefundProcessed { .. } => "refund_processed",
            Event::RefundFailed { .. } => "refund_failed",
            Event::RefundRequired { .. } => "refund_required",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("commerce_events_total", 1, "event" => event.name());

        match &event {
            Event::OrderCreated(order_id) => info!(%order_id, "order created"),
            Event::OrderCancelled(order_id) => info!(%order_id, "order cancelled"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::OrderPaid(order_id) => info!(%order_id, "order paid"),
            Event::PaymentSucceeded(payment_id) => info!(%payment_id, "payment succeeded"),
            Event::PaymentFailed(payment_id) => warn!(%payment_id, "payment failed"),
            Event::RefundProcessed {
                payment_id,
                refund_id,
                amount,
            } => info!(%payment_id, %refund_id, %amount, "refund processed"),
            Event::RefundFailed {
                payment_id,
                refund_id,
            } => warn!(%payment_id, %refund_id, "refund failed at gateway"),
            Event::RefundRequired {
                order_id,
                payment_id,
            } => warn!(%order_id, %payment_id, "captured payment needs a refund"),
            other => debug!(event = ?other, "event received"),
        }
    }

    info!("Event processing loop stopped");
}
