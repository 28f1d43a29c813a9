#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use stateset_commerce::{
    build_router,
    config::AppConfig,
    db,
    entities::commerce::{coupon, CouponModel, CouponType, PaymentMethod, ProductModel},
    events::{self, EventSender},
    gateway::{
        ChargeOutcome, GatewayError, InitializeRequest, InitializeResponse, PaymentGateway,
        RefundRequest, RefundResponse,
    },
    handlers::AppServices,
    notifications::{Notification, NotificationError, NotificationService},
    services::commerce::{Address, CheckoutInput, CreateProductInput},
    webhooks, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-process gateway double with scriptable failures.
#[derive(Default)]
pub struct FakeGateway {
    initialize_failure: Mutex<Option<String>>,
    refund_failure: Mutex<Option<String>>,
    verify_outcomes: Mutex<HashMap<String, ChargeOutcome>>,
    pub initialized: Mutex<Vec<InitializeRequest>>,
    pub refunds: Mutex<Vec<RefundRequest>>,
}

impl FakeGateway {
    pub fn fail_initialize(&self, message: &str) {
        *self.initialize_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_refunds(&self, message: &str) {
        *self.refund_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.initialize_failure.lock().unwrap() = None;
        *self.refund_failure.lock().unwrap() = None;
    }

    pub fn set_verify_outcome(&self, outcome: ChargeOutcome) {
        self.verify_outcomes
            .lock()
            .unwrap()
            .insert(outcome.reference.clone(), outcome);
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeResponse, GatewayError> {
        if let Some(message) = self.initialize_failure.lock().unwrap().clone() {
            return Err(GatewayError::Rejected(message));
        }
        let response = InitializeResponse {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: format!("ac_{}", request.reference.to_lowercase()),
            reference: request.reference.clone(),
        };
        self.initialized.lock().unwrap().push(request);
        Ok(response)
    }

    async fn verify(&self, reference: &str) -> Result<ChargeOutcome, GatewayError> {
        self.verify_outcomes
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown reference {}", reference)))
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, GatewayError> {
        if let Some(message) = self.refund_failure.lock().unwrap().clone() {
            return Err(GatewayError::Rejected(message));
        }
        self.refunds.lock().unwrap().push(request);
        Ok(RefundResponse {
            gateway_reference: Some(format!("rf_{}", Uuid::new_v4().simple())),
            status: "processed".into(),
        })
    }
}

/// Notifier that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application after adjusting the default test config.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let config = Arc::new(cfg);
        let (tx, rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(tx));
        let event_task = tokio::spawn(events::process_events(rx));

        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            gateway.clone(),
            notifier.clone(),
        );
        let state = AppState {
            db: db.clone(),
            config: config.clone(),
            event_sender: event_sender.clone(),
            services,
        };

        Self {
            router: build_router(state.clone()),
            state,
            db,
            config,
            event_sender,
            gateway,
            notifier,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal, stock: i32) -> ProductModel {
        self.services()
            .products
            .create_product(CreateProductInput {
                name: format!("Product {}", sku),
                sku: sku.to_string(),
                price,
                image_url: None,
                is_active: true,
                track_stock: true,
                stock,
                allow_backorders: false,
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        coupon_type: CouponType,
        value: Decimal,
        customize: impl FnOnce(&mut coupon::ActiveModel),
    ) -> CouponModel {
        let now = Utc::now();
        let mut model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            coupon_type: Set(coupon_type),
            value: Set(value),
            minimum_order_amount: Set(None),
            maximum_discount_amount: Set(None),
            usage_limit: Set(None),
            usage_limit_per_user: Set(None),
            times_used: Set(0),
            is_active: Set(true),
            starts_at: Set(Some(now - Duration::days(1))),
            expires_at: Set(Some(now + Duration::days(30))),
            created_at: Set(now),
            updated_at: Set(now),
        };
        customize(&mut model);
        model.insert(&*self.db).await.expect("seed coupon")
    }

    /// Send a request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("valid request");
        self.send(request).await
    }

    /// Post a raw webhook body with the given signature header.
    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/payments/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(self.config.payment.signature_header.as_str(), signature);
        }
        let request = builder
            .body(Body::from(body.to_vec()))
            .expect("valid request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }
}

pub fn address() -> Address {
    Address {
        name: "Ada Obi".into(),
        email: "ada@example.com".into(),
        phone: "+2348000000000".into(),
        address: "12 Marina Road".into(),
        city: "Lagos".into(),
        state: "Lagos".into(),
        country: "NG".into(),
        postal_code: Some("101241".into()),
    }
}

pub fn checkout_input() -> CheckoutInput {
    CheckoutInput {
        billing: address(),
        shipping: None,
        shipping_same_as_billing: true,
        payment_method: PaymentMethod::Card,
        notes: None,
    }
}

/// Webhook body for a charge event plus its valid signature.
pub fn signed_charge_event(event: &str, reference: &str, amount_minor: i64) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&json!({
        "event": event,
        "data": {
            "reference": reference,
            "status": if event == webhooks::CHARGE_SUCCESS { "success" } else { "failed" },
            "amount": amount_minor,
            "channel": "card",
            "gateway_response": if event == webhooks::CHARGE_SUCCESS { "Approved" } else { "Declined" },
            "authorization": { "last4": "4081", "card_type": "visa" }
        }
    }))
    .expect("webhook json");
    let signature = webhooks::sign(WEBHOOK_SECRET, &body).expect("signature");
    (body, signature)
}
