use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

static DEBUG_ERRORS: AtomicBool = AtomicBool::new(false);

/// Toggles exposure of underlying causes in error bodies.
pub fn set_debug_errors(enabled: bool) {
    DEBUG_ERRORS.store(enabled, Ordering::Relaxed);
}

fn debug_errors() -> bool {
    DEBUG_ERRORS.load(Ordering::Relaxed)
}

/// Standard error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured details (failing checkout lines, causes in debug mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// One failing cart line found while checking checkout preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutIssue {
    ProductUnavailable {
        product_id: Uuid,
    },
    OutOfStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
}

impl fmt::Display for CheckoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProductUnavailable { product_id } => {
                write!(f, "product {} is no longer available", product_id)
            }
            Self::OutOfStock {
                product_id,
                requested,
                available,
            } => write!(
                f,
                "product {} has {} in stock, {} requested",
                product_id, available, requested
            ),
        }
    }
}

fn join_issues(issues: &[CheckoutIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    OutOfStock { product_id: Uuid, requested: i32 },

    #[error("Product {0} is unavailable")]
    ProductUnavailable(Uuid),

    #[error("Coupon invalid: {0}")]
    CouponInvalid(String),

    #[error("Order cannot be cancelled: {0}")]
    OrderNotCancellable(String),

    #[error("Order {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Checkout preconditions failed: {}", join_issues(.0))]
    CheckoutPreconditions(Vec<CheckoutIssue>),

    #[error("Checkout failed: {0}")]
    CheckoutFailed(Box<ServiceError>),

    #[error("Refund of {requested} exceeds refundable balance {available}")]
    RefundExceedsBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for stock failures, whether caught before or inside checkout.
    pub fn is_out_of_stock(&self) -> bool {
        match self {
            Self::OutOfStock { .. } => true,
            Self::CheckoutPreconditions(issues) => issues
                .iter()
                .any(|issue| matches!(issue, CheckoutIssue::OutOfStock { .. })),
            Self::CheckoutFailed(inner) => inner.is_out_of_stock(),
            _ => false,
        }
    }

    /// Errors whose text is safe to show to the caller.
    fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::ConcurrentModification(_)
        )
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::EmptyCart => {
                StatusCode::BAD_REQUEST
            }
            Self::SignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::OutOfStock { .. }
            | Self::ProductUnavailable(_)
            | Self::CouponInvalid(_)
            | Self::CheckoutPreconditions(_)
            | Self::RefundExceedsBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::OrderNotCancellable(_)
            | Self::AlreadyPaid(_)
            | Self::InvalidTransition { .. }
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::PaymentGatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::CheckoutFailed(inner) if inner.is_user_facing() => inner.status_code(),
            Self::CheckoutFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::ConcurrentModification(_) => {
                "The resource was modified concurrently, retry the request".to_string()
            }
            Self::CheckoutFailed(inner) if inner.is_user_facing() => {
                format!("Checkout failed: {}", inner.response_message())
            }
            Self::CheckoutFailed(_) => "Checkout could not be completed".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::CheckoutPreconditions(issues) => serde_json::to_value(issues).ok(),
            _ if debug_errors() && !self.is_user_facing() => {
                Some(serde_json::Value::String(self.to_string()))
            }
            Self::CheckoutFailed(inner) if debug_errors() => {
                Some(serde_json::Value::String(inner.to_string()))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn checkout_failure_hides_database_cause() {
        let err = ServiceError::CheckoutFailed(Box::new(ServiceError::DatabaseError(
            DbErr::Custom("constraint violated on orders".into()),
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Checkout could not be completed");
        assert!(!err.response_message().contains("orders"));
    }

    #[test]
    fn checkout_failure_surfaces_stock_cause() {
        let product_id = Uuid::new_v4();
        let err = ServiceError::CheckoutFailed(Box::new(ServiceError::OutOfStock {
            product_id,
            requested: 2,
        }));
        assert!(err.is_out_of_stock());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.response_message().contains(&product_id.to_string()));
    }

    #[test]
    fn preconditions_list_every_issue() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = ServiceError::CheckoutPreconditions(vec![
            CheckoutIssue::ProductUnavailable { product_id: a },
            CheckoutIssue::OutOfStock {
                product_id: b,
                requested: 3,
                available: 1,
            },
        ]);
        let message = err.to_string();
        assert!(message.contains(&a.to_string()));
        assert!(message.contains(&b.to_string()));
        assert!(err.is_out_of_stock());

        let details = err.details().unwrap();
        assert_matches!(details, serde_json::Value::Array(ref items) if items.len() == 2);
    }

    #[test]
    fn signature_mismatch_is_unauthorized() {
        assert_eq!(
            ServiceError::SignatureMismatch.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
