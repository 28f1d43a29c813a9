use crate::errors::ServiceError;
use crate::handlers::common::validate_input;
use crate::handlers::AppState;
use crate::services::commerce::RefundInput;
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify/:reference", get(verify_payment))
        .route("/:id/refunds", post(refund_payment))
        .route("/webhook", post(super::payment_webhooks::payment_webhook))
}

/// Callback target after the shopper returns from the gateway page.
async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state.services.payments.verify(&reference).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Operator route. No caller check is applied here; deployments expose it
/// only behind their back-office gateway.
async fn refund_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let outcome = state.services.payments.process_refund(id, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}
