use crate::{entities::commerce::CartOwner, errors::ServiceError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Caller identity taken from the `x-user-id` and `x-session-id` headers.
///
/// Authentication happens upstream; these headers are trusted as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl Caller {
    /// Cart owner for this caller; a user id wins over a session id.
    pub fn cart_owner(&self) -> Result<CartOwner, ServiceError> {
        match (self.user_id, &self.session_id) {
            (Some(user_id), _) => Ok(CartOwner::User(user_id)),
            (None, Some(session_id)) => Ok(CartOwner::Session(session_id.clone())),
            (None, None) => Err(ServiceError::ValidationError(format!(
                "either {} or {} header is required",
                USER_ID_HEADER, SESSION_ID_HEADER
            ))),
        }
    }

    pub fn require_user(&self) -> Result<Uuid, ServiceError> {
        self.user_id.ok_or_else(|| {
            ServiceError::ValidationError(format!("{} header is required", USER_ID_HEADER))
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|_| {
                    ServiceError::ValidationError(format!("{} must be a UUID", USER_ID_HEADER))
                })
            })
            .transpose()?;
        let session_id = header(SESSION_ID_HEADER);

        if session_id.as_ref().is_some_and(|s| s.len() > 128) {
            return Err(ServiceError::ValidationError(format!(
                "{} is too long",
                SESSION_ID_HEADER
            )));
        }

        Ok(Self {
            user_id,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ServiceError> {
        let mut builder = Request::builder().uri("/cart");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn user_header_takes_precedence() {
        let user_id = Uuid::new_v4();
        let caller = extract(&[
            (USER_ID_HEADER, &user_id.to_string()),
            (SESSION_ID_HEADER, "sess-1"),
        ])
        .await
        .unwrap();

        assert_eq!(caller.cart_owner().unwrap(), CartOwner::User(user_id));
        assert_eq!(caller.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn session_only_caller_owns_guest_cart() {
        let caller = extract(&[(SESSION_ID_HEADER, "sess-2")]).await.unwrap();
        assert_eq!(
            caller.cart_owner().unwrap(),
            CartOwner::Session("sess-2".into())
        );
        assert!(caller.require_user().is_err());
    }

    #[tokio::test]
    async fn malformed_user_id_is_rejected() {
        let err = extract(&[(USER_ID_HEADER, "not-a-uuid")]).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn anonymous_caller_has_no_cart() {
        let caller = extract(&[]).await.unwrap();
        assert!(caller.cart_owner().is_err());
    }
}
