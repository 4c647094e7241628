//! Requester identity.
//!
//! Authentication happens upstream; the gateway in front of this service
//! forwards the authenticated customer id in `x-user-id`.

use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerId(pub Uuid);

impl<S> FromRequestParts<S> for CustomerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(CustomerId)
            .ok_or_else(|| {
                let err = AppError::new(AppErrorKind::Validation(ValidationError::Unauthenticated));
                match get_request_id_from_headers(&parts.headers) {
                    Some(request_id) => err.with_request_id(request_id),
                    None => err,
                }
            })
    }
}
