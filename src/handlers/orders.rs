use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::common::{validate_input, Caller};
use crate::{
    entities::commerce::{OrderModel, OrderStatus},
    errors::ServiceError,
    ApiResponse, AppState,
};

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", post(update_order_status))
        .route("/:id/payments", post(initialize_payment))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Orders placed by a user are only visible to that user. Guest orders are
/// addressed by id alone.
fn ensure_visible(order: &OrderModel, caller: &Caller) -> Result<(), ServiceError> {
    match order.user_id {
        Some(owner) if caller.user_id != Some(owner) => Err(ServiceError::NotFound(format!(
            "Order {} not found",
            order.id
        ))),
        _ => Ok(()),
    }
}

async fn load_visible_order(
    state: &AppState,
    caller: &Caller,
    order_id: Uuid,
) -> Result<OrderModel, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    ensure_visible(&order, caller)?;
    Ok(order)
}

// GET /orders
async fn list_orders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = caller.require_user()?;
    let orders = state.services.orders.list_orders_for_user(user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

// GET /orders/:id
async fn get_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    load_visible_order(&state, &caller, id).await?;
    let order = state.services.orders.get_order_with_items(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

// POST /orders/:id/cancel
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    load_visible_order(&state, &caller, id).await?;

    let order = state.services.orders.cancel(id, payload.reason).await?;
    Ok(Json(ApiResponse::success(order)))
}

// POST /orders/:id/status
/// Operator route for fulfilment. No caller check is applied here;
/// deployments expose it only behind their back-office gateway.
async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.advance(id, payload.status).await?;
    Ok(Json(ApiResponse::success(order)))
}

// POST /orders/:id/payments
async fn initialize_payment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    load_visible_order(&state, &caller, id).await?;

    let payment = state.services.payments.initialize(id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}
