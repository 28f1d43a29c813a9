use crate::handlers::common::{success_response, validate_input, Caller};
use crate::{
    errors::ServiceError,
    services::commerce::{cart_service::AddToCartInput, CartWithItems},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:item_id", put(update_cart_item).delete(remove_cart_item))
        .route("/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/merge", post(merge_guest_cart))
}

/// Cart as returned to clients
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: CartWithItems,
    pub item_count: i32,
}

impl From<CartWithItems> for CartResponse {
    fn from(cart: CartWithItems) -> Self {
        let item_count = cart.item_count();
        Self { cart, item_count }
    }
}

async fn caller_cart_id(state: &AppState, caller: &Caller) -> Result<Uuid, ServiceError> {
    let owner = caller.cart_owner()?;
    Ok(state.services.cart.get_or_create(&owner).await?.id)
}

/// Get the caller's cart, creating an empty one on first access
async fn get_cart(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ServiceError> {
    let cart_id = caller_cart_id(&state, &caller).await?;
    let cart = state.services.cart.get_cart(cart_id).await?;
    Ok(success_response(CartResponse::from(cart)))
}

/// Add item to cart
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart_id = caller_cart_id(&state, &caller).await?;

    let input = AddToCartInput {
        product_id: payload.product_id,
        quantity: payload.quantity,
        options: payload.options,
    };
    let cart = state.services.cart.add_item(cart_id, input).await?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Update cart item quantity
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart_id = caller_cart_id(&state, &caller).await?;

    let cart = state
        .services
        .cart
        .update_quantity(cart_id, item_id, payload.quantity)
        .await?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Remove item from cart
async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart_id = caller_cart_id(&state, &caller).await?;
    let cart = state.services.cart.remove_item(cart_id, item_id).await?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Clear all items from cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ServiceError> {
    let cart_id = caller_cart_id(&state, &caller).await?;
    state.services.cart.clear(cart_id).await?;
    let cart = state.services.cart.get_cart(cart_id).await?;

    Ok(success_response(CartResponse::from(cart)))
}

async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart_id = caller_cart_id(&state, &caller).await?;
    let cart = state
        .services
        .cart
        .apply_coupon(cart_id, &payload.code)
        .await?;

    Ok(success_response(CartResponse::from(cart)))
}

async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ServiceError> {
    let cart_id = caller_cart_id(&state, &caller).await?;
    let cart = state.services.cart.remove_coupon(cart_id).await?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Merge the session's guest cart into the signed-in user's cart
async fn merge_guest_cart(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = caller.require_user()?;
    let session_id = caller.session_id.as_deref().ok_or_else(|| {
        ServiceError::ValidationError("x-session-id header is required to merge".to_string())
    })?;

    let cart = state
        .services
        .cart
        .merge_guest_into_user(session_id, user_id)
        .await?;

    Ok(success_response(CartResponse::from(cart)))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 9999))]
    pub quantity: i32,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0, max = 9999))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}
