use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use std::sync::Arc;

use crate::{errors::ServiceError, AppState};

// POST /payments/webhook
//
// The body is taken raw so the signature is checked over the exact bytes
// the gateway signed.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let header = state.config.payment.signature_header.as_str();
    let signature = headers.get(header).and_then(|value| value.to_str().ok());

    let ack = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(ack))
}
