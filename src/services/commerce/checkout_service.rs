use crate::{
    config::{AppConfig, CouponCheckoutPolicy},
    entities::commerce::{
        cart, order, order_item, product, CartItemModel, CartModel, CartOwner, Order, OrderItemModel,
        OrderModel, OrderPaymentStatus, OrderStatus, PaymentMethod, Product, ProductModel,
    },
    errors::{CheckoutIssue, ServiceError},
    events::{Event, EventSender},
    services::commerce::{
        cart_service::CartService,
        coupon_service::{CouponService, CouponValidation},
        order_lifecycle::OrderWithItems,
        stock_ledger::{ProductStockLedger, StockLedger},
    },
};
use chrono::Utc;
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutInput {
    #[validate]
    pub billing: Address,
    #[serde(default)]
    #[validate]
    pub shipping: Option<Address>,
    #[serde(default)]
    pub shipping_same_as_billing: bool,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl CheckoutInput {
    /// Shipping address after applying the same-as-billing flag.
    pub fn resolved_shipping(&self) -> Result<&Address, ServiceError> {
        if self.shipping_same_as_billing {
            return Ok(&self.billing);
        }
        self.shipping.as_ref().ok_or_else(|| {
            ServiceError::ValidationError(
                "shipping address is required unless shipping_same_as_billing is set".to_string(),
            )
        })
    }
}

/// Builds `PREFIX-YYYYMMDD-XXXXXXXX`.
pub fn generate_order_number(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ORDER_NUMBER_CHARSET[rng.gen_range(0..ORDER_NUMBER_CHARSET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

/// Converts a cart into an order in a single transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    cart_service: CartService,
    stock_ledger: Arc<dyn StockLedger>,
}

struct ValidatedCheckout {
    user_id: Option<Uuid>,
    email: String,
    billing: serde_json::Value,
    shipping: serde_json::Value,
    payment_method: PaymentMethod,
    notes: Option<String>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let cart_service = CartService::new(db.clone(), event_sender.clone(), config.clone());
        Self {
            db,
            event_sender,
            config,
            cart_service,
            stock_ledger: Arc::new(ProductStockLedger),
        }
    }

    pub fn with_stock_ledger(mut self, stock_ledger: Arc<dyn StockLedger>) -> Self {
        self.stock_ledger = stock_ledger;
        self
    }

    /// Places an order from the owner's cart.
    ///
    /// Every precondition failure is reported together before any write.
    /// Failures inside the transaction roll everything back and surface as
    /// `CheckoutFailed`.
    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        owner: &CartOwner,
        input: CheckoutInput,
    ) -> Result<OrderWithItems, ServiceError> {
        input.validate()?;
        let shipping = input.resolved_shipping()?.clone();

        let cart = CartService::find_cart_by_owner(&*self.db, owner)
            .await?
            .ok_or(ServiceError::EmptyCart)?;
        let lines = CartService::load_items(&*self.db, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        self.check_lines(&lines).await?;
        let cart = self.check_coupon(cart, &lines, owner.user_id()).await?;

        let details = ValidatedCheckout {
            user_id: owner.user_id(),
            email: input.billing.email.clone(),
            billing: to_json(&input.billing)?,
            shipping: to_json(&shipping)?,
            payment_method: input.payment_method,
            notes: input.notes.clone(),
        };

        let txn = self.db.begin().await?;
        let placed = match self.place_order(&txn, cart, details).await {
            Ok(placed) => placed,
            Err(err) => {
                warn!(error = %err, "checkout rolled back");
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "checkout rollback failed");
                }
                counter!("commerce_checkouts_total", 1, "outcome" => "failed");
                return Err(ServiceError::CheckoutFailed(Box::new(err)));
            }
        };
        txn.commit()
            .await
            .map_err(|e| ServiceError::CheckoutFailed(Box::new(e.into())))?;

        counter!("commerce_checkouts_total", 1, "outcome" => "placed");
        self.event_sender
            .send_or_log(Event::OrderCreated(placed.order.id))
            .await;
        info!(
            order_id = %placed.order.id,
            order_number = %placed.order.order_number,
            total = %placed.order.total,
            "order placed"
        );
        Ok(placed)
    }

    /// Product availability and summed stock per product, all lines at once.
    async fn check_lines(&self, lines: &[CartItemModel]) -> Result<(), ServiceError> {
        let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in lines {
            *requested.entry(line.product_id).or_default() += line.quantity;
        }

        let products: HashMap<Uuid, ProductModel> = Product::find()
            .filter(product::Column::Id.is_in(requested.keys().copied()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut issues = Vec::new();
        for (product_id, quantity) in requested {
            match products.get(&product_id) {
                Some(product) if product.is_active => {
                    if let Some(available) = product.available_stock() {
                        if quantity > available {
                            issues.push(CheckoutIssue::OutOfStock {
                                product_id,
                                requested: quantity,
                                available,
                            });
                        }
                    }
                }
                _ => issues.push(CheckoutIssue::ProductUnavailable { product_id }),
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            debug!(issues = issues.len(), "checkout preconditions failed");
            Err(ServiceError::CheckoutPreconditions(issues))
        }
    }

    /// Re-validates the cart coupon and applies the configured policy.
    async fn check_coupon(
        &self,
        cart: CartModel,
        lines: &[CartItemModel],
        user_id: Option<Uuid>,
    ) -> Result<CartModel, ServiceError> {
        let Some(code) = cart.coupon_code.clone() else {
            return Ok(cart);
        };

        let subtotal: Decimal = lines.iter().map(|line| line.subtotal).sum();
        let validation = match CouponService::find_by_code_with(&*self.db, &code).await? {
            Some(coupon) => {
                CouponService::validate_with(&*self.db, &coupon, subtotal, user_id).await?
            }
            None => CouponValidation::invalid("Coupon no longer exists"),
        };
        if validation.valid {
            return Ok(cart);
        }

        match self.config.coupon_checkout_policy {
            CouponCheckoutPolicy::Reject => validation.into_result().map(|_| cart),
            CouponCheckoutPolicy::Drop => {
                info!(%code, reason = ?validation.reason, "dropping invalid coupon at checkout");
                let txn = self.db.begin().await?;
                let mut active: cart::ActiveModel = cart.into();
                active.coupon_code = Set(None);
                let cart = active.update(&txn).await?;
                let cart = self.cart_service.recalculate(&txn, cart).await?;
                txn.commit().await?;
                Ok(cart)
            }
        }
    }

    async fn place_order(
        &self,
        txn: &DatabaseTransaction,
        cart: CartModel,
        details: ValidatedCheckout,
    ) -> Result<OrderWithItems, ServiceError> {
        let had_coupon = cart.coupon_code.is_some();
        let cart = self.cart_service.recalculate(txn, cart).await?;
        if had_coupon
            && cart.coupon_code.is_none()
            && self.config.coupon_checkout_policy == CouponCheckoutPolicy::Reject
        {
            return Err(ServiceError::CouponInvalid(
                "Coupon is no longer valid".to_string(),
            ));
        }

        let lines = CartService::load_items(txn, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let order_number = self.unique_order_number(txn).await?;
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number),
            user_id: Set(details.user_id),
            customer_email: Set(details.email),
            status: Set(OrderStatus::Pending),
            payment_status: Set(OrderPaymentStatus::Pending),
            payment_method: Set(details.payment_method),
            currency: Set(cart.currency.clone()),
            subtotal: Set(cart.subtotal),
            discount_amount: Set(cart.discount_amount),
            tax_amount: Set(cart.tax_amount),
            total: Set(cart.total),
            coupon_code: Set(cart.coupon_code.clone()),
            billing_address: Set(details.billing),
            shipping_address: Set(details.shipping),
            notes: Set(details.notes),
            cancellation_reason: Set(None),
            cancelled_at: Set(None),
            paid_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            items.push(Self::snapshot_line(txn, &order, line).await?);
            self.stock_ledger
                .decrement(txn, line.product_id, line.quantity)
                .await?;
        }

        if let Some(code) = cart.coupon_code.as_deref() {
            let coupon = CouponService::find_by_code_with(txn, code)
                .await?
                .ok_or_else(|| ServiceError::CouponInvalid("Coupon no longer exists".into()))?;
            CouponService::redeem(txn, &coupon, details.user_id, order.id, order.discount_amount)
                .await?;
        }

        CartService::clear_with(txn, cart).await?;

        Ok(OrderWithItems { order, items })
    }

    async fn snapshot_line(
        txn: &DatabaseTransaction,
        order: &OrderModel,
        line: &CartItemModel,
    ) -> Result<OrderItemModel, ServiceError> {
        let product = Product::find_by_id(line.product_id)
            .one(txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or(ServiceError::ProductUnavailable(line.product_id))?;

        Ok(order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            product_name: Set(product.name),
            sku: Set(product.sku),
            image_url: Set(product.image_url),
            unit_price: Set(line.price),
            quantity: Set(line.quantity),
            subtotal: Set(line.subtotal),
            options: Set(line.options.clone()),
            created_at: Set(order.created_at),
        }
        .insert(txn)
        .await?)
    }

    async fn unique_order_number(&self, txn: &DatabaseTransaction) -> Result<String, ServiceError> {
        for attempt in 1..=self.config.order_number_attempts {
            let candidate = generate_order_number(&self.config.order_number_prefix);
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
            warn!(attempt, "order number collision");
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".to_string(),
        ))
    }
}

fn to_json(address: &Address) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(address)
        .map_err(|e| ServiceError::InternalError(format!("address serialization failed: {}", e)))
}
