use crate::handlers::common::{created_response, Caller};
use crate::{errors::ServiceError, services::commerce::CheckoutInput, AppState};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use std::sync::Arc;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(checkout))
}

/// Convert the caller's cart into a pending order
async fn checkout(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = caller.cart_owner()?;
    let order = state.services.checkout.checkout(&owner, payload).await?;

    Ok(created_response(order))
}
