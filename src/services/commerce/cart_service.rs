use crate::{
    config::AppConfig,
    entities::commerce::{
        cart, cart_item, Cart, CartItem, CartItemModel, CartModel, CartOwner, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::{
        coupon_service::CouponService,
        pricing_service::{line_subtotal, CartTotals},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service.
///
/// Every mutation runs in one transaction and ends with
/// [`CartService::recalculate`], so persisted totals always satisfy
/// `total == subtotal - discount_amount + tax_amount`.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// Input for adding an item to cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// Cart with its line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartWithItems {
    #[serde(flatten)]
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}

impl CartWithItems {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Returns the owner's cart, creating an empty one on first touch.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, owner: &CartOwner) -> Result<CartModel, ServiceError> {
        if let Some(cart) = Self::find_cart_by_owner(&*self.db, owner).await? {
            return Ok(cart);
        }

        match Self::insert_cart(&*self.db, owner, &self.config.default_currency).await {
            Ok(cart) => {
                info!(cart_id = %cart.id, "created cart");
                Ok(cart)
            }
            // Lost the unique (owner_type, owner_id) race; the winner's row is the cart.
            Err(ServiceError::DatabaseError(err))
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                debug!("concurrent cart creation, re-reading");
                Self::find_cart_by_owner(&*self.db, owner)
                    .await?
                    .ok_or_else(|| ServiceError::InternalError("cart vanished after insert race".into()))
            }
            Err(err) => Err(err),
        }
    }

    /// Reads the owner's cart with lines, without creating it.
    pub async fn find_by_owner(
        &self,
        owner: &CartOwner,
    ) -> Result<Option<CartWithItems>, ServiceError> {
        match Self::find_cart_by_owner(&*self.db, owner).await? {
            Some(cart) => {
                let items = Self::load_items(&*self.db, cart.id).await?;
                Ok(Some(CartWithItems { cart, items }))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Self::load_cart(&*self.db, cart_id).await?;
        let items = Self::load_items(&*self.db, cart_id).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Adds a product, merging into an existing line with the same options.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, quantity = input.quantity))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or(ServiceError::ProductUnavailable(input.product_id))?;

        let existing = Self::load_items(&txn, cart_id)
            .await?
            .into_iter()
            .find(|item| item.matches(product.id, input.options.as_ref()));

        let requested = existing.as_ref().map_or(0, |item| item.quantity) + input.quantity;
        if !product.can_fulfill(requested) {
            return Err(ServiceError::OutOfStock {
                product_id: product.id,
                requested,
            });
        }

        let now = Utc::now();
        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(requested);
                item.price = Set(product.price);
                item.subtotal = Set(line_subtotal(product.price, requested));
                item.updated_at = Set(now);
                item.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(product.id),
                    quantity: Set(input.quantity),
                    price: Set(product.price),
                    subtotal: Set(line_subtotal(product.price, input.quantity)),
                    options: Set(cart_item::normalize_options(input.options.as_ref()).cloned()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let cart = self.recalculate(&txn, cart).await?;
        let items = Self::load_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        Ok(CartWithItems { cart, items })
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;
        let item = Self::load_item(&txn, cart_id, item_id).await?;

        if quantity == 0 {
            CartItem::delete_by_id(item.id).exec(&txn).await?;
        } else {
            if let Some(product) = Product::find_by_id(item.product_id).one(&txn).await? {
                if !product.can_fulfill(quantity) {
                    return Err(ServiceError::OutOfStock {
                        product_id: product.id,
                        requested: quantity,
                    });
                }
            }

            let price = item.price;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.subtotal = Set(line_subtotal(price, quantity));
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        let cart = self.recalculate(&txn, cart).await?;
        let items = Self::load_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        Ok(CartWithItems { cart, items })
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;
        let item = Self::load_item(&txn, cart_id, item_id).await?;
        CartItem::delete_by_id(item.id).exec(&txn).await?;

        let cart = self.recalculate(&txn, cart).await?;
        let items = Self::load_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        Ok(CartWithItems { cart, items })
    }

    /// Removes every line and resets totals and coupon.
    #[instrument(skip(self))]
    pub async fn clear(&self, cart_id: Uuid) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;
        let cart = Self::clear_with(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;
        info!("Cleared cart: {}", cart_id);
        Ok(cart)
    }

    /// Clears a cart on the caller's connection or transaction.
    pub(crate) async fn clear_with<C: ConnectionTrait>(
        conn: &C,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(conn)
            .await?;

        let mut cart: cart::ActiveModel = cart.into();
        cart.coupon_code = Set(None);
        cart.subtotal = Set(Decimal::ZERO);
        cart.discount_amount = Set(Decimal::ZERO);
        cart.tax_amount = Set(Decimal::ZERO);
        cart.total = Set(Decimal::ZERO);
        cart.updated_at = Set(Utc::now());
        Ok(cart.update(conn).await?)
    }

    /// Validates and attaches a coupon, then recalculates.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;

        let coupon = CouponService::find_by_code_with(&txn, code)
            .await?
            .ok_or_else(|| ServiceError::CouponInvalid("Coupon not found".to_string()))?;

        let items = Self::load_items(&txn, cart_id).await?;
        let subtotal: Decimal = items.iter().map(|item| item.subtotal).sum();
        CouponService::validate_with(&txn, &coupon, subtotal, cart.user_id())
            .await?
            .into_result()?;

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(Some(coupon.code.clone()));
        let cart = active.update(&txn).await?;

        let cart = self.recalculate(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponApplied {
                cart_id,
                code: coupon.code,
            })
            .await;
        Ok(CartWithItems { cart, items })
    }

    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = Self::load_cart(&txn, cart_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(None);
        let cart = active.update(&txn).await?;

        let cart = self.recalculate(&txn, cart).await?;
        let items = Self::load_items(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        Ok(CartWithItems { cart, items })
    }

    /// Folds a guest cart into the user's cart.
    ///
    /// Lines are summed or moved and the coupon carried over inside one
    /// transaction; the guest cart is deleted only after that commits.
    #[instrument(skip(self))]
    pub async fn merge_guest_into_user(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let guest_owner = CartOwner::Session(session_id.to_string());
        let user_owner = CartOwner::User(user_id);

        let txn = self.db.begin().await?;

        let Some(guest) = Self::find_cart_by_owner(&txn, &guest_owner).await? else {
            txn.commit().await?;
            let cart = self.get_or_create(&user_owner).await?;
            return self.get_cart(cart.id).await;
        };

        let user_cart = match Self::find_cart_by_owner(&txn, &user_owner).await? {
            Some(cart) => cart,
            None => Self::insert_cart(&txn, &user_owner, &guest.currency).await?,
        };

        let mut user_items = Self::load_items(&txn, user_cart.id).await?;
        let guest_items = Self::load_items(&txn, guest.id).await?;
        let now = Utc::now();

        for guest_item in guest_items {
            match user_items
                .iter_mut()
                .find(|item| item.matches(guest_item.product_id, guest_item.options.as_ref()))
            {
                Some(target) => {
                    let quantity = target.quantity + guest_item.quantity;
                    let mut active: cart_item::ActiveModel = target.clone().into();
                    active.quantity = Set(quantity);
                    active.subtotal = Set(line_subtotal(target.price, quantity));
                    active.updated_at = Set(now);
                    *target = active.update(&txn).await?;
                }
                None => {
                    let mut active: cart_item::ActiveModel = guest_item.into();
                    active.cart_id = Set(user_cart.id);
                    active.updated_at = Set(now);
                    user_items.push(active.update(&txn).await?);
                }
            }
        }

        let user_cart = if user_cart.coupon_code.is_none() && guest.coupon_code.is_some() {
            let mut active: cart::ActiveModel = user_cart.into();
            active.coupon_code = Set(guest.coupon_code.clone());
            active.update(&txn).await?
        } else {
            user_cart
        };

        let cart = self.recalculate(&txn, user_cart).await?;
        let items = Self::load_items(&txn, cart.id).await?;
        txn.commit().await?;

        // Remaining guest lines were summed into the user cart.
        let cleanup = async {
            let txn = self.db.begin().await?;
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(guest.id))
                .exec(&txn)
                .await?;
            Cart::delete_by_id(guest.id).exec(&txn).await?;
            txn.commit().await?;
            Ok::<_, ServiceError>(())
        };
        if let Err(err) = cleanup.await {
            warn!(guest_cart_id = %guest.id, error = %err, "failed to delete merged guest cart");
        }

        self.event_sender
            .send_or_log(Event::CartsMerged {
                guest_cart_id: guest.id,
                user_cart_id: cart.id,
            })
            .await;
        info!(guest_cart_id = %guest.id, user_cart_id = %cart.id, "merged guest cart");
        Ok(CartWithItems { cart, items })
    }

    /// Re-derives subtotal, discount, tax and total from the current lines.
    ///
    /// A coupon that no longer validates is dropped silently.
    pub async fn recalculate<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        let items = Self::load_items(conn, cart.id).await?;
        let subtotal: Decimal = items.iter().map(|item| item.subtotal).sum();

        let mut coupon_code = cart.coupon_code.clone();
        let mut discount = Decimal::ZERO;
        if let Some(code) = cart.coupon_code.as_deref() {
            let coupon = CouponService::find_by_code_with(conn, code).await?;
            let still_valid = match &coupon {
                Some(coupon) => {
                    CouponService::validate_with(conn, coupon, subtotal, cart.user_id())
                        .await?
                        .valid
                }
                None => false,
            };
            match coupon {
                Some(coupon) if still_valid => {
                    discount = CouponService::calculate_discount(&coupon, subtotal);
                }
                _ => {
                    debug!(cart_id = %cart.id, code, "dropping coupon that no longer applies");
                    coupon_code = None;
                }
            }
        }

        let totals = CartTotals::compute(subtotal, discount, self.config.tax_rate());

        let mut active: cart::ActiveModel = cart.into();
        active.coupon_code = Set(coupon_code);
        active.subtotal = Set(totals.subtotal);
        active.discount_amount = Set(totals.discount);
        active.tax_amount = Set(totals.tax);
        active.total = Set(totals.total);
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    pub(crate) async fn find_cart_by_owner<C: ConnectionTrait>(
        conn: &C,
        owner: &CartOwner,
    ) -> Result<Option<CartModel>, ServiceError> {
        let (owner_type, owner_id) = owner.to_columns();
        Ok(Cart::find()
            .filter(cart::Column::OwnerType.eq(owner_type))
            .filter(cart::Column::OwnerId.eq(owner_id))
            .one(conn)
            .await?)
    }

    async fn insert_cart<C: ConnectionTrait>(
        conn: &C,
        owner: &CartOwner,
        currency: &str,
    ) -> Result<CartModel, ServiceError> {
        let (owner_type, owner_id) = owner.to_columns();
        let now = Utc::now();
        Ok(cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_type: Set(owner_type),
            owner_id: Set(owner_id),
            coupon_code: Set(None),
            currency: Set(currency.to_string()),
            subtotal: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?)
    }

    pub(crate) async fn load_cart<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    pub(crate) async fn load_items<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<CartItemModel>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    async fn load_item<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart_id {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }
        Ok(item)
    }
}
