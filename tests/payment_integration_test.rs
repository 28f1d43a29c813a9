mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use common::{checkout_input, signed_charge_event, TestApp, WEBHOOK_SECRET};
use rust_decimal_macros::dec;
use serde_json::json;
use stateset_commerce::{
    entities::commerce::{
        CartOwner, OrderModel, OrderPaymentStatus, OrderStatus, PaymentModel, PaymentStatus,
        RefundStatus,
    },
    errors::ServiceError,
    gateway::{to_minor_units, ChargeOutcome},
    services::commerce::{AddToCartInput, ReconcileStatus, RefundInput, WebhookAck},
    webhooks,
};
use uuid::Uuid;

async fn order_for(app: &TestApp, price: rust_decimal::Decimal) -> OrderModel {
    let product = app
        .seed_product(&format!("SKU-{}", Uuid::new_v4().simple()), price, 10)
        .await;
    let owner = CartOwner::User(Uuid::new_v4());
    let cart = app.services().cart.get_or_create(&owner).await.unwrap();
    app.services()
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                product_id: product.id,
                quantity: 1,
                options: None,
            },
        )
        .await
        .unwrap();
    app.services()
        .checkout
        .checkout(&owner, checkout_input())
        .await
        .unwrap()
        .order
}

async fn paid_order(app: &TestApp, price: rust_decimal::Decimal) -> (OrderModel, PaymentModel) {
    let order = order_for(app, price).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();
    let result = app
        .services()
        .payments
        .reconcile(ChargeOutcome::success(payment.reference.clone(), order.total))
        .await
        .unwrap();
    assert_eq!(result.status, ReconcileStatus::Confirmed);
    (order, result.payment)
}

#[tokio::test]
async fn initialize_opens_a_processing_payment() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(4500)).await;

    let payment = app.services().payments.initialize(order.id).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.amount, dec!(4500));
    assert_eq!(payment.gateway, "fake");
    assert!(payment.reference.starts_with("PAY-"));
    assert!(payment.authorization_url.is_some());
    assert_eq!(payment.metadata.as_ref().unwrap()["order_number"], json!(order.order_number));

    let sent = app.gateway.initialized.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "ada@example.com");
    assert_eq!(sent[0].amount, dec!(4500));
}

#[tokio::test]
async fn initialize_failure_leaves_order_retryable() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(1000)).await;
    app.gateway.fail_initialize("gateway down");

    let err = app
        .services()
        .payments
        .initialize(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentGatewayError(_));

    let payments = app.services().payments.list_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    let unchanged = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(unchanged.status, OrderStatus::Pending);
    assert_eq!(unchanged.payment_status, OrderPaymentStatus::Pending);

    app.gateway.recover();
    let retry = app.services().payments.initialize(order.id).await.unwrap();
    assert_eq!(retry.status, PaymentStatus::Processing);
    assert_ne!(retry.reference, payments[0].reference);
}

#[tokio::test]
async fn paid_or_cancelled_orders_cannot_start_a_payment() {
    let app = TestApp::new().await;
    let (paid, _) = paid_order(&app, dec!(1000)).await;
    let err = app.services().payments.initialize(paid.id).await.unwrap_err();
    assert_matches!(err, ServiceError::AlreadyPaid(id) if id == paid.id);

    let open = order_for(&app, dec!(1000)).await;
    app.services().orders.cancel(open.id, None).await.unwrap();
    let err = app.services().payments.initialize(open.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn duplicate_webhook_confirms_once() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(2500)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();
    let (body, signature) = signed_charge_event(
        webhooks::CHARGE_SUCCESS,
        &payment.reference,
        to_minor_units(order.total).unwrap(),
    );

    let (status, ack) = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "result": "processed", "status": "confirmed" }));

    let (status, ack) = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "result": "processed", "status": "already_processed" }));

    assert_eq!(app.notifier.count(), 1);
    let settled = app.services().payments.get_payment(payment.id).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.channel.as_deref(), Some("card"));
    assert_eq!(settled.metadata.as_ref().unwrap()["authorization"]["last4"], json!("4081"));
    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(2500)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();
    let (body, signature) = signed_charge_event(webhooks::CHARGE_FAILED, &payment.reference, 250_000);
    let tampered = String::from_utf8(body)
        .unwrap()
        .replace("charge.failed", "charge.success")
        .replace("failed", "success");

    let (status, _) = app.post_webhook(tampered.as_bytes(), Some(&signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post_webhook(tampered.as_bytes(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unchanged = app.services().payments.get_payment(payment.id).await.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Processing);
    assert_eq!(app.notifier.count(), 0);
}

#[tokio::test]
async fn unknown_and_undecodable_webhooks_are_acknowledged() {
    let app = TestApp::new().await;
    let services = app.services();

    let body = serde_json::to_vec(&json!({
        "event": "transfer.success",
        "data": { "reference": "TRF-1", "status": "success" }
    }))
    .unwrap();
    let signature = webhooks::sign(WEBHOOK_SECRET, &body).unwrap();
    let ack = services
        .payments
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Ignored);

    let garbage = b"not json at all";
    let signature = webhooks::sign(WEBHOOK_SECRET, garbage).unwrap();
    let ack = services
        .payments
        .handle_webhook(garbage, Some(&signature))
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Ignored);

    let (body, signature) = signed_charge_event(webhooks::CHARGE_SUCCESS, "PAY-MISSING", 100);
    let ack = services
        .payments
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Errored);
}

#[tokio::test]
async fn failed_charge_keeps_order_open() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(1800)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();
    let (body, signature) =
        signed_charge_event(webhooks::CHARGE_FAILED, &payment.reference, 180_000);

    let (status, ack) = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "result": "processed", "status": "failed" }));

    let failed = app.services().payments.get_payment(payment.id).await.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.gateway_response.as_deref(), Some("Declined"));
    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);

    // A success arriving late still settles the payment.
    let (body, signature) =
        signed_charge_event(webhooks::CHARGE_SUCCESS, &payment.reference, 180_000);
    let (_, ack) = app.post_webhook(&body, Some(&signature)).await;
    assert_eq!(ack, json!({ "result": "processed", "status": "confirmed" }));
}

#[tokio::test]
async fn charge_after_cancellation_is_kept_for_refund_without_confirming() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(2200)).await;
    let payments = &app.services().payments;
    let payment = payments.initialize(order.id).await.unwrap();
    app.services().orders.cancel(order.id, None).await.unwrap();

    let result = payments
        .reconcile(ChargeOutcome::success(payment.reference.clone(), order.total))
        .await
        .unwrap();

    assert_eq!(result.status, ReconcileStatus::Confirmed);
    assert_eq!(result.payment.status, PaymentStatus::Success);
    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    assert!(order.paid_at.is_some());
    assert_eq!(app.notifier.count(), 0);

    let refunded = payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(2200),
                reason: Some("order cancelled".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn mismatched_amount_is_recorded_as_failure() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(1800)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();

    let result = app
        .services()
        .payments
        .reconcile(ChargeOutcome::success(payment.reference.clone(), dec!(18)))
        .await
        .unwrap();

    assert_eq!(result.status, ReconcileStatus::Failed);
    assert!(result
        .payment
        .gateway_response
        .as_deref()
        .unwrap()
        .contains("amount mismatch"));
    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert!(!order.is_paid());
}

#[tokio::test]
async fn verify_reconciles_the_gateway_answer() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(3200)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();

    let mut pending = ChargeOutcome::success(payment.reference.clone(), order.total);
    pending.status = stateset_commerce::gateway::ChargeStatus::Pending;
    app.gateway.set_verify_outcome(pending);
    let result = app.services().payments.verify(&payment.reference).await.unwrap();
    assert_eq!(result.status, ReconcileStatus::Pending);

    app.gateway
        .set_verify_outcome(ChargeOutcome::success(payment.reference.clone(), order.total));
    let result = app.services().payments.verify(&payment.reference).await.unwrap();
    assert_eq!(result.status, ReconcileStatus::Confirmed);

    let result = app.services().payments.verify(&payment.reference).await.unwrap();
    assert_eq!(result.status, ReconcileStatus::AlreadyProcessed);
    assert_eq!(app.notifier.count(), 1);
}

#[tokio::test]
async fn partial_then_full_refund() {
    let app = TestApp::new().await;
    let (order, payment) = paid_order(&app, dec!(1000)).await;
    let payments = &app.services().payments;

    let partial = payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(400),
                reason: Some("damaged box".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(partial.payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.payment.refunded_amount, dec!(400));
    assert_eq!(partial.refund.status, RefundStatus::Processed);
    assert!(partial.refund.gateway_reference.is_some());
    let after_partial = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(after_partial.payment_status, OrderPaymentStatus::PartiallyRefunded);

    let full = payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(600),
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(full.payment.status, PaymentStatus::Refunded);
    assert_eq!(full.payment.refunded_amount, dec!(1000));

    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(payments.list_refunds(payment.id).await.unwrap().len(), 2);
    assert_eq!(app.gateway.refund_count(), 2);
}

#[tokio::test]
async fn refund_beyond_balance_is_rejected() {
    let app = TestApp::new().await;
    let (_, payment) = paid_order(&app, dec!(1000)).await;
    let payments = &app.services().payments;
    payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(700),
                reason: None,
            },
        )
        .await
        .unwrap();

    let err = payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(300.01),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::RefundExceedsBalance { requested, available }
            if requested == dec!(300.01) && available == dec!(300)
    );
    assert_eq!(app.gateway.refund_count(), 1);
}

#[tokio::test]
async fn refund_requires_a_captured_payment() {
    let app = TestApp::new().await;
    let order = order_for(&app, dec!(1000)).await;
    let payment = app.services().payments.initialize(order.id).await.unwrap();

    let err = app
        .services()
        .payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(10),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let err = app
        .services()
        .payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(0),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn gateway_refund_failure_releases_the_reservation() {
    let app = TestApp::new().await;
    let (order, payment) = paid_order(&app, dec!(1000)).await;
    app.gateway.fail_refunds("insufficient balance");

    let err = app
        .services()
        .payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(1000),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentGatewayError(_));

    let restored = app.services().payments.get_payment(payment.id).await.unwrap();
    assert_eq!(restored.status, PaymentStatus::Success);
    assert_eq!(restored.refunded_amount, dec!(0));
    let refunds = app.services().payments.list_refunds(payment.id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].status, RefundStatus::Failed);

    let order = app.services().orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(order.status, OrderStatus::Confirmed);

    app.gateway.recover();
    let outcome = app
        .services()
        .payments
        .process_refund(
            payment.id,
            RefundInput {
                amount: dec!(250),
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.payment.refunded_amount, dec!(250));
}
