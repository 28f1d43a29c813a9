use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::commerce::{
        payment, refund, Order, OrderModel, OrderStatus, Payment, PaymentModel, PaymentStatus,
        Refund, RefundModel, RefundStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{ChargeOutcome, ChargeStatus, InitializeRequest, PaymentGateway, RefundRequest},
    notifications::{Notification, NotificationService},
    services::commerce::{order_lifecycle::OrderService, pricing_service::round_currency},
    webhooks::{verify_signature, WebhookPayload},
};

const RECONCILIATIONS: &str = "commerce_payment_reconciliations_total";
const COMPENSATION_ATTEMPTS: usize = 3;

/// What a reconciliation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// This call recorded the success.
    Confirmed,
    Failed,
    /// Already settled earlier; nothing changed.
    AlreadyProcessed,
    /// Gateway has no final answer yet.
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    pub payment: PaymentModel,
    pub status: ReconcileStatus,
}

/// Acknowledgement returned to the gateway for a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "status")]
pub enum WebhookAck {
    Processed(ReconcileStatus),
    /// Unknown event or undecodable payload.
    Ignored,
    /// Reconciliation failed; logged and acknowledged.
    Errored,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundInput {
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub payment: PaymentModel,
    pub refund: RefundModel,
}

/// Payment initialization, reconciliation and refunds.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationService>,
}

pub fn generate_payment_reference() -> String {
    format!("PAY-{}", Uuid::new_v4().simple()).to_uppercase()
}

/// Payment status after `refunded` of `amount` has been handed back.
pub fn refund_status(amount: Decimal, refunded: Decimal) -> PaymentStatus {
    if refunded <= Decimal::ZERO {
        PaymentStatus::Success
    } else if refunded >= amount {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    }
}

fn merge_metadata(
    existing: Option<serde_json::Value>,
    outcome: &ChargeOutcome,
) -> Option<serde_json::Value> {
    let mut merged = match existing {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    if let Some(authorization) = &outcome.authorization {
        merged.insert("authorization".into(), authorization.clone());
    }
    if let Some(currency) = &outcome.currency {
        merged.insert("charged_currency".into(), json!(currency));
    }
    if merged.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(merged))
    }
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            gateway,
            notifier,
        }
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<PaymentModel, ServiceError> {
        Payment::find()
            .filter(payment::Column::Reference.eq(reference))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", reference)))
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentModel>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<RefundModel>, ServiceError> {
        Ok(Refund::find()
            .filter(refund::Column::PaymentId.eq(payment_id))
            .order_by_asc(refund::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Starts a gateway transaction for the order total.
    ///
    /// The payment row is committed before the gateway is called. A gateway
    /// failure leaves that row `failed` and the order open for another attempt.
    #[instrument(skip(self))]
    pub async fn initialize(&self, order_id: Uuid) -> Result<PaymentModel, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid(order_id));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is {}",
                order.order_number, order.status
            )));
        }
        let settled = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.is_in([
                PaymentStatus::Success,
                PaymentStatus::PartiallyRefunded,
                PaymentStatus::Refunded,
            ]))
            .one(&*self.db)
            .await?;
        if settled.is_some() {
            return Err(ServiceError::AlreadyPaid(order_id));
        }

        let now = Utc::now();
        let metadata = json!({
            "order_id": order.id,
            "order_number": order.order_number,
        });
        let pending = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            reference: Set(generate_payment_reference()),
            gateway: Set(self.gateway.name().to_string()),
            status: Set(PaymentStatus::Pending),
            amount: Set(order.total),
            refunded_amount: Set(Decimal::ZERO),
            currency: Set(order.currency.clone()),
            channel: Set(None),
            gateway_response: Set(None),
            authorization_url: Set(None),
            access_code: Set(None),
            metadata: Set(Some(metadata.clone())),
            paid_at: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        let request = InitializeRequest {
            reference: pending.reference.clone(),
            email: order.customer_email.clone(),
            amount: order.total,
            currency: order.currency.clone(),
            callback_url: self.config.payment.callback_url.clone(),
            metadata,
        };

        match self.gateway.initialize(request).await {
            Ok(response) => {
                let mut active: payment::ActiveModel = pending.into();
                active.status = Set(PaymentStatus::Processing);
                active.authorization_url = Set(Some(response.authorization_url));
                active.access_code = Set(Some(response.access_code));
                active.updated_at = Set(Utc::now());
                let payment = active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentInitialized(payment.id))
                    .await;
                info!(payment_id = %payment.id, reference = %payment.reference, "payment initialized");
                Ok(payment)
            }
            Err(err) => {
                warn!(reference = %pending.reference, error = %err, "gateway initialize failed");
                counter!("commerce_payment_initialize_failures_total", 1);
                let mut active: payment::ActiveModel = pending.into();
                active.status = Set(PaymentStatus::Failed);
                active.gateway_response = Set(Some(err.to_string()));
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
                Err(err.into())
            }
        }
    }

    /// Asks the gateway for the charge outcome, then reconciles it.
    #[instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<ReconcileResult, ServiceError> {
        let outcome = self.gateway.verify(reference).await?;
        if outcome.reference != reference {
            return Err(ServiceError::PaymentGatewayError(format!(
                "gateway answered for {} when asked about {}",
                outcome.reference, reference
            )));
        }
        self.reconcile(outcome).await
    }

    /// Records a gateway outcome against its payment.
    ///
    /// Both `verify` and webhooks land here. A payment already captured is
    /// returned untouched. Only the call whose conditional update wins sends
    /// the confirmation notification.
    #[instrument(skip(self, outcome), fields(reference = %outcome.reference, status = ?outcome.status))]
    pub async fn reconcile(&self, outcome: ChargeOutcome) -> Result<ReconcileResult, ServiceError> {
        let payment = self.find_by_reference(&outcome.reference).await?;

        if payment.status.is_captured() {
            debug!(payment_id = %payment.id, "payment already captured");
            counter!(RECONCILIATIONS, 1, "outcome" => "already_processed");
            return Ok(ReconcileResult {
                payment,
                status: ReconcileStatus::AlreadyProcessed,
            });
        }

        match outcome.status {
            ChargeStatus::Pending => Ok(ReconcileResult {
                payment,
                status: ReconcileStatus::Pending,
            }),
            ChargeStatus::Failed => {
                let message = outcome
                    .gateway_response
                    .clone()
                    .unwrap_or_else(|| "Declined".to_string());
                self.record_failure(payment, message).await
            }
            ChargeStatus::Success => {
                if let Some(mismatch) = Self::amount_mismatch(&payment, &outcome) {
                    warn!(payment_id = %payment.id, %mismatch, "charge does not match payment");
                    return self.record_failure(payment, mismatch).await;
                }
                self.record_success(payment, outcome).await
            }
        }
    }

    fn amount_mismatch(payment: &PaymentModel, outcome: &ChargeOutcome) -> Option<String> {
        if let Some(amount) = outcome.amount {
            if round_currency(amount) != round_currency(payment.amount) {
                return Some(format!(
                    "amount mismatch: expected {}, charged {}",
                    round_currency(payment.amount),
                    round_currency(amount)
                ));
            }
        }
        if let Some(currency) = &outcome.currency {
            if !currency.eq_ignore_ascii_case(&payment.currency) {
                return Some(format!(
                    "currency mismatch: expected {}, charged {}",
                    payment.currency, currency
                ));
            }
        }
        None
    }

    async fn record_success(
        &self,
        payment: PaymentModel,
        outcome: ChargeOutcome,
    ) -> Result<ReconcileResult, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let result = Payment::update_many()
            .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Success))
            .col_expr(payment::Column::Channel, Expr::value(outcome.channel.clone()))
            .col_expr(
                payment::Column::GatewayResponse,
                Expr::value(outcome.gateway_response.clone()),
            )
            .col_expr(
                payment::Column::Metadata,
                Expr::value(merge_metadata(payment.metadata.clone(), &outcome)),
            )
            .col_expr(
                payment::Column::PaidAt,
                Expr::value(Some(outcome.paid_at.unwrap_or(now))),
            )
            .col_expr(
                payment::Column::Version,
                Expr::col(payment::Column::Version).add(1),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(now))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.is_in(PaymentStatus::SETTLEABLE))
            .exec(&txn)
            .await;

        let rows = match result {
            Ok(result) => result.rows_affected,
            // Another payment for this order already holds the success slot.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                warn!(payment_id = %payment.id, order_id = %payment.order_id, "order already has a successful payment");
                return Err(ServiceError::AlreadyPaid(payment.order_id));
            }
            Err(err) => return Err(err.into()),
        };

        if rows == 0 {
            txn.rollback().await?;
            let current = self.get_payment(payment.id).await?;
            if current.status.is_captured() {
                counter!(RECONCILIATIONS, 1, "outcome" => "already_processed");
                return Ok(ReconcileResult {
                    payment: current,
                    status: ReconcileStatus::AlreadyProcessed,
                });
            }
            return Err(ServiceError::invalid_transition(
                current.status,
                PaymentStatus::Success,
            ));
        }

        let order = OrderService::mark_paid(&txn, payment.order_id).await?;
        let settled = Payment::find_by_id(payment.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment.id)))?;
        txn.commit().await?;

        counter!(RECONCILIATIONS, 1, "outcome" => "confirmed");
        self.event_sender
            .send_or_log(Event::PaymentSucceeded(settled.id))
            .await;
        if order.status == OrderStatus::Cancelled {
            warn!(payment_id = %settled.id, order_number = %order.order_number, "payment confirmed for cancelled order");
            self.event_sender
                .send_or_log(Event::RefundRequired {
                    order_id: order.id,
                    payment_id: settled.id,
                })
                .await;
        } else {
            info!(payment_id = %settled.id, order_number = %order.order_number, "payment confirmed");
            self.event_sender.send_or_log(Event::OrderPaid(order.id)).await;
            self.notify(Notification::order_confirmation(&order, order.user_id))
                .await;
        }

        Ok(ReconcileResult {
            payment: settled,
            status: ReconcileStatus::Confirmed,
        })
    }

    async fn record_failure(
        &self,
        payment: PaymentModel,
        message: String,
    ) -> Result<ReconcileResult, ServiceError> {
        let result = Payment::update_many()
            .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Failed))
            .col_expr(payment::Column::GatewayResponse, Expr::value(Some(message)))
            .col_expr(
                payment::Column::Version,
                Expr::col(payment::Column::Version).add(1),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.is_in(PaymentStatus::FAILABLE))
            .exec(&*self.db)
            .await?;

        let current = self.get_payment(payment.id).await?;
        if current.status.is_captured() {
            counter!(RECONCILIATIONS, 1, "outcome" => "already_processed");
            return Ok(ReconcileResult {
                payment: current,
                status: ReconcileStatus::AlreadyProcessed,
            });
        }

        if result.rows_affected > 0 {
            counter!(RECONCILIATIONS, 1, "outcome" => "failed");
            self.event_sender
                .send_or_log(Event::PaymentFailed(current.id))
                .await;
            info!(payment_id = %current.id, "payment failed");
        }
        Ok(ReconcileResult {
            payment: current,
            status: ReconcileStatus::Failed,
        })
    }

    /// Authenticates and dispatches a gateway webhook.
    ///
    /// Signature failures are the only error; everything after that is
    /// acknowledged so the gateway stops redelivering.
    #[instrument(skip(self, body, signature), fields(body_len = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, ServiceError> {
        let secret = self.config.payment.webhook_signing_secret();
        let verified = match signature {
            Some(signature) => verify_signature(secret, body, signature),
            None => Err(ServiceError::SignatureMismatch),
        };
        if let Err(err) = verified {
            counter!("commerce_webhook_rejections_total", 1);
            warn!(has_signature = signature.is_some(), "webhook signature rejected");
            return Err(err);
        }

        let payload = match WebhookPayload::parse(body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "undecodable webhook acknowledged");
                return Ok(WebhookAck::Ignored);
            }
        };

        let Some(outcome) = payload.charge_outcome() else {
            info!(event = %payload.event, "unhandled webhook event acknowledged");
            return Ok(WebhookAck::Ignored);
        };

        match self.reconcile(outcome).await {
            Ok(result) => Ok(WebhookAck::Processed(result.status)),
            Err(err) => {
                error!(event = %payload.event, reference = %payload.data.reference, error = %err, "webhook reconciliation failed");
                Ok(WebhookAck::Errored)
            }
        }
    }

    /// Refunds part or all of a captured payment.
    ///
    /// The amount is reserved against the payment before the gateway call
    /// and released again if the gateway refuses.
    #[instrument(skip(self, input))]
    pub async fn process_refund(
        &self,
        payment_id: Uuid,
        input: RefundInput,
    ) -> Result<RefundOutcome, ServiceError> {
        input.validate()?;
        let amount = round_currency(input.amount);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Refund amount must be positive".to_string(),
            ));
        }

        let payment = self.get_payment(payment_id).await?;
        if !payment.status.is_refundable() {
            return Err(ServiceError::InvalidOperation(format!(
                "payment {} is {}",
                payment.reference, payment.status
            )));
        }
        let available = payment.refundable_amount();
        if amount > available {
            return Err(ServiceError::RefundExceedsBalance {
                requested: amount,
                available,
            });
        }

        let (refund, previous_order) = self.reserve_refund(&payment, amount, &input.reason).await?;

        let request = RefundRequest {
            reference: payment.reference.clone(),
            amount,
            reason: input.reason.clone(),
        };
        match self.gateway.refund(request).await {
            Ok(response) => {
                let mut active: refund::ActiveModel = refund.into();
                active.status = Set(RefundStatus::Processed);
                active.gateway_reference = Set(response.gateway_reference);
                active.updated_at = Set(Utc::now());
                let refund = active.update(&*self.db).await?;
                let payment = self.get_payment(payment_id).await?;

                counter!("commerce_refunds_total", 1, "outcome" => "processed");
                self.event_sender
                    .send_or_log(Event::RefundProcessed {
                        payment_id,
                        refund_id: refund.id,
                        amount,
                    })
                    .await;
                if let Some(order) = Order::find_by_id(payment.order_id).one(&*self.db).await? {
                    self.notify(Notification::refund_processed(&order, amount))
                        .await;
                }
                info!(%payment_id, refund_id = %refund.id, %amount, status = %payment.status, "refund processed");
                Ok(RefundOutcome { payment, refund })
            }
            Err(err) => {
                warn!(%payment_id, refund_id = %refund.id, error = %err, "gateway refund failed, releasing reservation");
                counter!("commerce_refunds_total", 1, "outcome" => "failed");
                self.release_refund(payment_id, &refund, &previous_order)
                    .await?;
                self.event_sender
                    .send_or_log(Event::RefundFailed {
                        payment_id,
                        refund_id: refund.id,
                    })
                    .await;
                Err(err.into())
            }
        }
    }

    async fn reserve_refund(
        &self,
        payment: &PaymentModel,
        amount: Decimal,
        reason: &Option<String>,
    ) -> Result<(RefundModel, OrderModel), ServiceError> {
        let refunded = payment.refunded_amount + amount;
        let status = refund_status(payment.amount, refunded);
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let result = Payment::update_many()
            .col_expr(payment::Column::RefundedAmount, Expr::value(refunded))
            .col_expr(payment::Column::Status, Expr::value(status))
            .col_expr(
                payment::Column::Version,
                Expr::col(payment::Column::Version).add(1),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(now))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Version.eq(payment.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::ConcurrentModification(payment.id));
        }

        let refund = refund::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment.id),
            amount: Set(amount),
            reason: Set(reason.clone()),
            status: Set(RefundStatus::Pending),
            gateway_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let previous_order = OrderService::apply_refund(
            &txn,
            payment.order_id,
            status == PaymentStatus::Refunded,
        )
        .await?;
        txn.commit().await?;

        debug!(payment_id = %payment.id, refund_id = %refund.id, %refunded, "refund reserved");
        Ok((refund, previous_order))
    }

    async fn release_refund(
        &self,
        payment_id: Uuid,
        refund: &RefundModel,
        previous_order: &OrderModel,
    ) -> Result<(), ServiceError> {
        for _ in 0..COMPENSATION_ATTEMPTS {
            let txn = self.db.begin().await?;
            let current = Payment::find_by_id(payment_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

            let refunded = (current.refunded_amount - refund.amount).max(Decimal::ZERO);
            let result = Payment::update_many()
                .col_expr(payment::Column::RefundedAmount, Expr::value(refunded))
                .col_expr(
                    payment::Column::Status,
                    Expr::value(refund_status(current.amount, refunded)),
                )
                .col_expr(
                    payment::Column::Version,
                    Expr::col(payment::Column::Version).add(1),
                )
                .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(payment::Column::Id.eq(payment_id))
                .filter(payment::Column::Version.eq(current.version))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                txn.rollback().await?;
                debug!(%payment_id, "refund release raced, retrying");
                continue;
            }

            Refund::update_many()
                .col_expr(refund::Column::Status, Expr::value(RefundStatus::Failed))
                .col_expr(refund::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(refund::Column::Id.eq(refund.id))
                .exec(&txn)
                .await?;
            OrderService::revert_refund(&txn, previous_order).await?;
            txn.commit().await?;
            return Ok(());
        }

        error!(%payment_id, refund_id = %refund.id, "could not release refund reservation");
        Err(ServiceError::ConcurrentModification(payment_id))
    }

    async fn notify(&self, notification: Notification) {
        let id = notification.id;
        if let Err(err) = self.notifier.send(notification).await {
            warn!(notification_id = %id, error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn refund_status_follows_balance() {
        assert_eq!(refund_status(dec!(6300), dec!(0)), PaymentStatus::Success);
        assert_eq!(
            refund_status(dec!(6300), dec!(1000)),
            PaymentStatus::PartiallyRefunded
        );
        assert_eq!(refund_status(dec!(6300), dec!(6300)), PaymentStatus::Refunded);
    }

    #[test]
    fn payment_references_are_unique_and_prefixed() {
        let a = generate_payment_reference();
        let b = generate_payment_reference();
        assert!(a.starts_with("PAY-"));
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_keeps_existing_keys_and_adds_authorization() {
        let mut outcome = ChargeOutcome::success("PAY-1", dec!(10));
        outcome.authorization = Some(json!({ "last4": "4081", "bank": "TEST BANK" }));

        let merged = merge_metadata(Some(json!({ "order_number": "ORD-1" })), &outcome)
            .expect("metadata");
        assert_eq!(merged["order_number"], "ORD-1");
        assert_eq!(merged["authorization"]["last4"], "4081");
    }

    #[test]
    fn mismatched_amount_is_detected() {
        let now = Utc::now();
        let payment = PaymentModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            reference: "PAY-1".into(),
            gateway: "paystack".into(),
            status: PaymentStatus::Processing,
            amount: dec!(6300.0000),
            refunded_amount: Decimal::ZERO,
            currency: "NGN".into(),
            channel: None,
            gateway_response: None,
            authorization_url: None,
            access_code: None,
            metadata: None,
            paid_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        assert!(PaymentService::amount_mismatch(&payment, &ChargeOutcome::success("PAY-1", dec!(6300))).is_none());
        assert!(PaymentService::amount_mismatch(&payment, &ChargeOutcome::success("PAY-1", dec!(630))).is_some());

        let mut foreign = ChargeOutcome::success("PAY-1", dec!(6300));
        foreign.currency = Some("USD".into());
        assert!(PaymentService::amount_mismatch(&payment, &foreign).is_some());
    }
}
